//! C5: the instruction set as a typed enum, plus the hand-written tokenizer
//! that turns one canonicalized source line into a variant. Per spec.md §9
//! this replaces the distilled source's ordered-regex dispatch with
//! `decode()` returning a concrete `Instruction`, then a single `match` in
//! [`crate::executor`] — removing both the `O(N_patterns)` rescans and the
//! `mov rd,imm` vs `mov rd,rn` ambiguity a shared regex prefix would invite.

use crate::error::EngineError;
use crate::operand::{
    parse_addressing_form, parse_imm_or_reg, parse_integer, parse_label, parse_register,
    split_operands, AddressingForm, ImmOrReg,
};
use crate::register::RegisterId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Mi,
    Pl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    LdpOffset { rt: RegisterId, rt2: RegisterId, form: AddressingForm },
    StpOffset { rt: RegisterId, rt2: RegisterId, form: AddressingForm },
    LdrLiteral { rd: RegisterId, var: String },
    LdrMem { rd: RegisterId, form: AddressingForm },
    StrMem { rd: RegisterId, form: AddressingForm },
    MovImm { rd: RegisterId, imm: i64 },
    MovReg { rd: RegisterId, rn: RegisterId },
    Add { rd: RegisterId, rn: RegisterId, rhs: ImmOrReg, flags: bool },
    Sub { rd: RegisterId, rn: RegisterId, rhs: ImmOrReg, flags: bool },
    Asr { rd: RegisterId, rn: RegisterId, imm: i64 },
    Lsl { rd: RegisterId, rn: RegisterId, imm: i64 },
    Mul { rd: RegisterId, rn: RegisterId, rm: RegisterId },
    Udiv { rd: RegisterId, rn: RegisterId, rm: RegisterId },
    Sdiv { rd: RegisterId, rn: RegisterId, rm: RegisterId },
    Madd { rd: RegisterId, rn: RegisterId, rm: RegisterId, ra: RegisterId },
    Msub { rd: RegisterId, rn: RegisterId, rm: RegisterId, ra: RegisterId },
    And { rd: RegisterId, rn: RegisterId, rhs: ImmOrReg, flags: bool },
    Orr { rd: RegisterId, rn: RegisterId, rhs: ImmOrReg, flags: bool },
    Eor { rd: RegisterId, rn: RegisterId, rhs: ImmOrReg, flags: bool },
    Cmp { rn: RegisterId, rhs: ImmOrReg },
    Cbnz { rn: RegisterId, label: String },
    Cbz { rn: RegisterId, label: String },
    B { label: String },
    BCond { cond: Condition, label: String },
    Bl { label: String },
    Ret,
    Svc,
    Label(String),
}

fn mnemonic_and_rest(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim_start()),
        None => (line, ""),
    }
}

fn expect_register(operands: &mut std::vec::IntoIter<String>, line: &str) -> Result<RegisterId, EngineError> {
    let field = operands.next().ok_or_else(|| syntax_error(line))?;
    parse_register(&field).ok_or_else(|| syntax_error(line))
}

fn expect_label(operands: &mut std::vec::IntoIter<String>, line: &str) -> Result<String, EngineError> {
    let field = operands.next().ok_or_else(|| syntax_error(line))?;
    parse_label(&field).ok_or_else(|| syntax_error(line))
}

fn expect_imm_or_reg(operands: &mut std::vec::IntoIter<String>, line: &str) -> Result<ImmOrReg, EngineError> {
    let field = operands.next().ok_or_else(|| syntax_error(line))?;
    parse_imm_or_reg(&field).ok_or_else(|| syntax_error(line))
}

fn syntax_error(line: &str) -> EngineError {
    EngineError::SyntaxOrUnsupportedInstruction {
        line: 0,
        text: line.to_string(),
    }
}

fn with_line(mut err: EngineError, line_no: usize) -> EngineError {
    if let EngineError::SyntaxOrUnsupportedInstruction { line, .. } = &mut err {
        *line = line_no;
    }
    err
}

/// Decodes a single canonicalized source line (no trailing newline, already
/// lowercased) into a typed [`Instruction`]. `line_no` is 1-based, used only
/// to annotate errors.
pub fn decode(line_no: usize, line: &str) -> Result<Instruction, EngineError> {
    decode_inner(line).map_err(|e| with_line(e, line_no))
}

fn decode_inner(line: &str) -> Result<Instruction, EngineError> {
    if line.ends_with(':') && crate::parser::is_label_line(line) {
        return Ok(Instruction::Label(line.to_string()));
    }

    let (mnemonic, rest) = mnemonic_and_rest(line);
    let base = mnemonic.trim_end_matches('s');
    let flags = mnemonic.ends_with('s') && matches!(base, "add" | "sub" | "and" | "orr" | "eor");

    match mnemonic {
        "ldp" | "stp" => decode_pair(mnemonic, rest, line),
        "ldr" => decode_ldr(rest, line),
        "str" => decode_str(rest, line),
        "mov" => decode_mov(rest, line),
        "mul" | "udiv" | "sdiv" | "madd" | "msub" => decode_rrr_family(mnemonic, rest, line),
        "asr" | "lsl" => decode_shift(mnemonic, rest, line),
        "cmp" => decode_cmp(rest, line),
        "cbnz" | "cbz" => decode_cb(mnemonic, rest, line),
        "bl" => {
            let mut operands = split_operands(rest).into_iter();
            let label = expect_label(&mut operands, line)?;
            Ok(Instruction::Bl { label })
        }
        "ret" => Ok(Instruction::Ret),
        "svc" if rest.trim() == "0" => Ok(Instruction::Svc),
        _ if base == "add" => decode_addsub(true, rest, flags, line),
        _ if base == "sub" => decode_addsub(false, rest, flags, line),
        _ if base == "and" => decode_logic(Logic::And, rest, flags, line),
        _ if base == "orr" => decode_logic(Logic::Orr, rest, flags, line),
        _ if base == "eor" => decode_logic(Logic::Eor, rest, flags, line),
        "b" => {
            let mut operands = split_operands(rest).into_iter();
            let label = expect_label(&mut operands, line)?;
            Ok(Instruction::B { label })
        }
        _ if mnemonic.starts_with("b.") => decode_bcond(mnemonic, rest, line),
        _ => Err(syntax_error(line)),
    }
}

enum Logic {
    And,
    Orr,
    Eor,
}

fn decode_pair(mnemonic: &str, rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let parts = split_operands(rest);
    if parts.len() < 3 {
        return Err(syntax_error(line));
    }
    let rt = parse_register(&parts[0]).ok_or_else(|| syntax_error(line))?;
    let rt2 = parse_register(&parts[1]).ok_or_else(|| syntax_error(line))?;
    let addressing_text = if parts.len() == 3 {
        parts[2].clone()
    } else {
        format!("{}, {}", parts[2], parts[3])
    };
    let form = parse_addressing_form(&addressing_text).ok_or_else(|| syntax_error(line))?;
    if mnemonic == "ldp" {
        Ok(Instruction::LdpOffset { rt, rt2, form })
    } else {
        Ok(Instruction::StpOffset { rt, rt2, form })
    }
}

fn decode_ldr(rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let parts = split_operands(rest);
    if parts.len() < 2 {
        return Err(syntax_error(line));
    }
    let rd = parse_register(&parts[0]).ok_or_else(|| syntax_error(line))?;
    if let Some(var) = parts[1].strip_prefix('=') {
        return Ok(Instruction::LdrLiteral {
            rd,
            var: var.to_string(),
        });
    }
    let addressing_text = if parts.len() == 2 {
        parts[1].clone()
    } else {
        format!("{}, {}", parts[1], parts[2])
    };
    let form = parse_addressing_form(&addressing_text).ok_or_else(|| syntax_error(line))?;
    Ok(Instruction::LdrMem { rd, form })
}

fn decode_str(rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let parts = split_operands(rest);
    if parts.len() < 2 {
        return Err(syntax_error(line));
    }
    let rd = parse_register(&parts[0]).ok_or_else(|| syntax_error(line))?;
    let addressing_text = if parts.len() == 2 {
        parts[1].clone()
    } else {
        format!("{}, {}", parts[1], parts[2])
    };
    let form = parse_addressing_form(&addressing_text).ok_or_else(|| syntax_error(line))?;
    Ok(Instruction::StrMem { rd, form })
}

fn decode_mov(rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rd = expect_register(&mut operands, line)?;
    let field = operands.next().ok_or_else(|| syntax_error(line))?;
    if let Some(reg) = parse_register(&field) {
        Ok(Instruction::MovReg { rd, rn: reg })
    } else if let Some(imm) = parse_integer(&field) {
        Ok(Instruction::MovImm { rd, imm })
    } else {
        Err(syntax_error(line))
    }
}

fn decode_addsub(is_add: bool, rest: &str, flags: bool, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rd = expect_register(&mut operands, line)?;
    let rn = expect_register(&mut operands, line)?;
    let rhs = expect_imm_or_reg(&mut operands, line)?;
    if is_add {
        Ok(Instruction::Add { rd, rn, rhs, flags })
    } else {
        Ok(Instruction::Sub { rd, rn, rhs, flags })
    }
}

fn decode_logic(kind: Logic, rest: &str, flags: bool, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rd = expect_register(&mut operands, line)?;
    let rn = expect_register(&mut operands, line)?;
    let rhs = expect_imm_or_reg(&mut operands, line)?;
    Ok(match kind {
        Logic::And => Instruction::And { rd, rn, rhs, flags },
        Logic::Orr => Instruction::Orr { rd, rn, rhs, flags },
        Logic::Eor => Instruction::Eor { rd, rn, rhs, flags },
    })
}

fn decode_shift(mnemonic: &str, rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rd = expect_register(&mut operands, line)?;
    let rn = expect_register(&mut operands, line)?;
    let field = operands.next().ok_or_else(|| syntax_error(line))?;
    let imm = parse_integer(&field).ok_or_else(|| syntax_error(line))?;
    if mnemonic == "asr" {
        Ok(Instruction::Asr { rd, rn, imm })
    } else {
        Ok(Instruction::Lsl { rd, rn, imm })
    }
}

fn decode_rrr_family(mnemonic: &str, rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rd = expect_register(&mut operands, line)?;
    let rn = expect_register(&mut operands, line)?;
    let rm = expect_register(&mut operands, line)?;
    match mnemonic {
        "mul" => Ok(Instruction::Mul { rd, rn, rm }),
        "udiv" => Ok(Instruction::Udiv { rd, rn, rm }),
        "sdiv" => Ok(Instruction::Sdiv { rd, rn, rm }),
        "madd" => {
            let ra = expect_register(&mut operands, line)?;
            Ok(Instruction::Madd { rd, rn, rm, ra })
        }
        "msub" => {
            let ra = expect_register(&mut operands, line)?;
            Ok(Instruction::Msub { rd, rn, rm, ra })
        }
        _ => unreachable!(),
    }
}

fn decode_cmp(rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rn = expect_register(&mut operands, line)?;
    let rhs = expect_imm_or_reg(&mut operands, line)?;
    if let ImmOrReg::Reg(RegisterId::Sp) = rhs {
        return Err(syntax_error(line));
    }
    Ok(Instruction::Cmp { rn, rhs })
}

fn decode_cb(mnemonic: &str, rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let rn = expect_register(&mut operands, line)?;
    let label = expect_label(&mut operands, line)?;
    if mnemonic == "cbnz" {
        Ok(Instruction::Cbnz { rn, label })
    } else {
        Ok(Instruction::Cbz { rn, label })
    }
}

fn decode_bcond(mnemonic: &str, rest: &str, line: &str) -> Result<Instruction, EngineError> {
    let mut operands = split_operands(rest).into_iter();
    let label = expect_label(&mut operands, line)?;
    if operands.next().is_some() {
        return Err(syntax_error(line));
    }
    let cond = match mnemonic {
        "b.eq" => Condition::Eq,
        "b.ne" => Condition::Ne,
        "b.lt" => Condition::Lt,
        "b.le" => Condition::Le,
        "b.gt" => Condition::Gt,
        "b.ge" => Condition::Ge,
        "b.mi" => Condition::Mi,
        "b.pl" => Condition::Pl,
        _ => return Err(syntax_error(line)),
    };
    Ok(Instruction::BCond { cond, label })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mov_immediate_vs_register() {
        assert_eq!(
            decode(1, "mov x0,#1").unwrap(),
            Instruction::MovImm { rd: RegisterId::X0, imm: 1 }
        );
        assert_eq!(
            decode(1, "mov x0,x1").unwrap(),
            Instruction::MovReg { rd: RegisterId::X0, rn: RegisterId::X1 }
        );
    }

    #[test]
    fn decodes_adds_with_flag_update() {
        assert_eq!(
            decode(1, "adds x0,x1,x1").unwrap(),
            Instruction::Add {
                rd: RegisterId::X0,
                rn: RegisterId::X1,
                rhs: ImmOrReg::Reg(RegisterId::X1),
                flags: true,
            }
        );
    }

    #[test]
    fn decodes_ldr_literal_and_mem_forms() {
        assert_eq!(
            decode(1, "ldr x1,=buf").unwrap(),
            Instruction::LdrLiteral { rd: RegisterId::X1, var: "buf".to_string() }
        );
        assert_eq!(
            decode(1, "ldr x1,[x2]").unwrap(),
            Instruction::LdrMem {
                rd: RegisterId::X1,
                form: AddressingForm::Plain(RegisterId::X2)
            }
        );
    }

    #[test]
    fn decodes_label_line() {
        assert_eq!(decode(1, "loop:").unwrap(), Instruction::Label("loop:".to_string()));
    }

    #[test]
    fn cmp_rejects_sp_as_second_operand() {
        assert!(decode(1, "cmp x0,sp").is_err());
    }

    #[test]
    fn decodes_conditional_branch() {
        assert_eq!(
            decode(1, "b.pl done").unwrap(),
            Instruction::BCond { cond: Condition::Pl, label: "done".to_string() }
        );
    }

    #[test]
    fn unsupported_mnemonic_is_syntax_error() {
        assert!(decode(1, "nop").is_err());
    }

    #[test]
    fn decodes_svc_zero() {
        assert_eq!(decode(1, "svc 0").unwrap(), Instruction::Svc);
    }

    #[test]
    fn svc_rejects_nonzero_operand() {
        assert!(decode(1, "svc 1").is_err());
    }
}
