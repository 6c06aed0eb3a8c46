//! C5's execution half: given a decoded [`Instruction`] and the engine's
//! mutable state, perform its effect. Pure branch-target resolution is the
//! caller's job (the main loop owns `pc`); this module reports where a
//! branch wants to go via [`ExecOutcome`] instead of mutating `pc` itself.

use crate::error::EngineError;
use crate::instruction::{Condition, Instruction};
use crate::memory::MemoryArena;
use crate::operand::{AddressingForm, ImmOrReg, ImmOrRegOffset};
use crate::register::{Flags, RegisterFile, RegisterId};
use crate::symbol::{Symbol, SymbolTable};

/// What the main loop should do after executing one instruction.
pub enum ExecOutcome {
    Next,
    Jump(String),
    /// `bl label`: `lr` has been set; the main loop resolves whether
    /// `label` is linked (host callback) or an internal jump target.
    Bl(String),
    Return,
    Exit,
}

fn resolve_rhs(regs: &RegisterFile, rhs: ImmOrReg) -> i64 {
    match rhs {
        ImmOrReg::Imm(v) => v,
        ImmOrReg::Reg(r) => regs.read(r),
    }
}

fn resolve_offset(regs: &RegisterFile, off: ImmOrRegOffset) -> i64 {
    match off {
        ImmOrRegOffset::Imm(v) => v,
        ImmOrRegOffset::Reg(r) => regs.read(r),
    }
}

/// Computes the effective address for a `[rn{,off}]` form and, if
/// indexed, the new value `rn` should take. Returns `(effective_addr,
/// new_rn_value)`.
fn effective_address(regs: &RegisterFile, form: &AddressingForm) -> (i64, Option<(RegisterId, i64)>) {
    match form {
        AddressingForm::Plain(rn) => (regs.read(*rn), None),
        AddressingForm::Offset(rn, off) => (regs.read(*rn) + resolve_offset(regs, *off), None),
        AddressingForm::PreIndex(rn, off) => {
            let addr = regs.read(*rn) + resolve_offset(regs, *off);
            (addr, Some((*rn, addr)))
        }
        AddressingForm::PostIndex(rn, off) => {
            let addr = regs.read(*rn);
            let updated = addr + resolve_offset(regs, *off);
            (addr, Some((*rn, updated)))
        }
    }
}

fn condition_taken(cond: Condition, flags: &Flags) -> bool {
    match cond {
        Condition::Eq => flags.zero,
        Condition::Ne => !flags.zero,
        Condition::Lt | Condition::Mi => flags.negative,
        Condition::Le => flags.negative || flags.zero,
        Condition::Gt => !flags.negative && !flags.zero,
        Condition::Ge => !flags.negative,
        // Source behavior, not ARM's architectural `¬N` — see DESIGN.md.
        Condition::Pl => !flags.negative || flags.zero,
    }
}

/// Executes one instruction. `pc` is the instruction's own index, needed so
/// `bl` can write the return address into `lr`.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    instr: &Instruction,
    pc: usize,
    regs: &mut RegisterFile,
    flags: &mut Flags,
    arena: &mut MemoryArena,
    symbols: &SymbolTable,
) -> Result<ExecOutcome, EngineError> {
    match instr {
        Instruction::Label(_) => Ok(ExecOutcome::Next),

        Instruction::LdrLiteral { rd, var } => {
            let value = match symbols.get(var) {
                Some(Symbol::Address { offset, .. }) => *offset as i64,
                Some(Symbol::Literal(v)) => *v,
                None => {
                    return Err(EngineError::SyntaxOrUnsupportedInstruction {
                        line: pc + 1,
                        text: format!("ldr =,{}", var),
                    })
                }
            };
            regs.write(*rd, value);
            Ok(ExecOutcome::Next)
        }

        Instruction::LdrMem { rd, form } => {
            let sp = regs.read(RegisterId::Sp);
            let (addr, update) = effective_address(regs, form);
            let value = arena.read_i64(addr, sp)?;
            regs.write(*rd, value);
            if let Some((rn, new_value)) = update {
                regs.write(rn, new_value);
            }
            Ok(ExecOutcome::Next)
        }

        Instruction::StrMem { rd, form } => {
            let sp = regs.read(RegisterId::Sp);
            let (addr, update) = effective_address(regs, form);
            arena.write_i64(addr, regs.read(*rd), sp)?;
            if let Some((rn, new_value)) = update {
                regs.write(rn, new_value);
            }
            Ok(ExecOutcome::Next)
        }

        Instruction::LdpOffset { rt, rt2, form } => {
            let sp = regs.read(RegisterId::Sp);
            let (addr, update) = effective_address(regs, form);
            let first = arena.read_i64(addr, sp)?;
            let second = arena.read_i64(addr + 8, sp)?;
            regs.write(*rt, first);
            regs.write(*rt2, second);
            if let Some((rn, new_value)) = update {
                regs.write(rn, new_value);
            }
            Ok(ExecOutcome::Next)
        }

        Instruction::StpOffset { rt, rt2, form } => {
            let sp = regs.read(RegisterId::Sp);
            let (addr, update) = effective_address(regs, form);
            arena.write_i64(addr, regs.read(*rt), sp)?;
            arena.write_i64(addr + 8, regs.read(*rt2), sp)?;
            if let Some((rn, new_value)) = update {
                regs.write(rn, new_value);
            }
            Ok(ExecOutcome::Next)
        }

        Instruction::MovImm { rd, imm } => {
            regs.write(*rd, *imm);
            Ok(ExecOutcome::Next)
        }
        Instruction::MovReg { rd, rn } => {
            regs.write(*rd, regs.read(*rn));
            Ok(ExecOutcome::Next)
        }

        Instruction::Add { rd, rn, rhs, flags: set_flags } => {
            let result = regs.read(*rn).wrapping_add(resolve_rhs(regs, *rhs));
            regs.write(*rd, result);
            if *set_flags {
                flags.set_from(result);
            }
            Ok(ExecOutcome::Next)
        }
        Instruction::Sub { rd, rn, rhs, flags: set_flags } => {
            let result = regs.read(*rn).wrapping_sub(resolve_rhs(regs, *rhs));
            regs.write(*rd, result);
            if *set_flags {
                flags.set_from(result);
            }
            Ok(ExecOutcome::Next)
        }

        Instruction::Asr { rd, rn, imm } => {
            // Native sign-extending shift on i64 — a deliberate improvement
            // over the unbounded-integer source behavior (spec Open Questions).
            regs.write(*rd, regs.read(*rn) >> imm);
            Ok(ExecOutcome::Next)
        }
        Instruction::Lsl { rd, rn, imm } => {
            regs.write(*rd, regs.read(*rn) << imm);
            Ok(ExecOutcome::Next)
        }

        Instruction::Mul { rd, rn, rm } => {
            regs.write(*rd, regs.read(*rn).wrapping_mul(regs.read(*rm)));
            Ok(ExecOutcome::Next)
        }
        Instruction::Udiv { rd, rn, rm } | Instruction::Sdiv { rd, rn, rm } => {
            let divisor = regs.read(*rm);
            if divisor == 0 {
                return Err(EngineError::SyntaxOrUnsupportedInstruction {
                    line: pc + 1,
                    text: "division by zero".to_string(),
                });
            }
            // udiv and sdiv both truncate toward zero (spec Open Questions).
            regs.write(*rd, regs.read(*rn).wrapping_div(divisor));
            Ok(ExecOutcome::Next)
        }
        Instruction::Madd { rd, rn, rm, ra } => {
            let result = regs.read(*ra).wrapping_add(regs.read(*rn).wrapping_mul(regs.read(*rm)));
            regs.write(*rd, result);
            Ok(ExecOutcome::Next)
        }
        Instruction::Msub { rd, rn, rm, ra } => {
            let result = regs.read(*ra).wrapping_sub(regs.read(*rn).wrapping_mul(regs.read(*rm)));
            regs.write(*rd, result);
            Ok(ExecOutcome::Next)
        }

        Instruction::And { rd, rn, rhs, flags: set_flags } => {
            let result = regs.read(*rn) & resolve_rhs(regs, *rhs);
            regs.write(*rd, result);
            if *set_flags {
                flags.set_from(result);
            }
            Ok(ExecOutcome::Next)
        }
        Instruction::Orr { rd, rn, rhs, flags: set_flags } => {
            let result = regs.read(*rn) | resolve_rhs(regs, *rhs);
            regs.write(*rd, result);
            if *set_flags {
                flags.set_from(result);
            }
            Ok(ExecOutcome::Next)
        }
        Instruction::Eor { rd, rn, rhs, flags: set_flags } => {
            let result = regs.read(*rn) ^ resolve_rhs(regs, *rhs);
            regs.write(*rd, result);
            if *set_flags {
                flags.set_from(result);
            }
            Ok(ExecOutcome::Next)
        }

        Instruction::Cmp { rn, rhs } => {
            let result = regs.read(*rn).wrapping_sub(resolve_rhs(regs, *rhs));
            flags.set_from(result);
            Ok(ExecOutcome::Next)
        }

        Instruction::Cbnz { rn, label } => {
            if regs.read(*rn) != 0 {
                Ok(ExecOutcome::Jump(label.clone()))
            } else {
                Ok(ExecOutcome::Next)
            }
        }
        Instruction::Cbz { rn, label } => {
            if regs.read(*rn) == 0 {
                Ok(ExecOutcome::Jump(label.clone()))
            } else {
                Ok(ExecOutcome::Next)
            }
        }

        Instruction::B { label } => Ok(ExecOutcome::Jump(label.clone())),
        Instruction::BCond { cond, label } => {
            if condition_taken(*cond, flags) {
                Ok(ExecOutcome::Jump(label.clone()))
            } else {
                Ok(ExecOutcome::Next)
            }
        }

        Instruction::Bl { label } => {
            regs.write(RegisterId::Lr, pc as i64);
            Ok(ExecOutcome::Bl(label.clone()))
        }

        Instruction::Ret => Ok(ExecOutcome::Return),

        Instruction::Svc => Ok(ExecOutcome::Next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::decode;

    fn exec(line: &str, regs: &mut RegisterFile, flags: &mut Flags) -> ExecOutcome {
        let instr = decode(1, line).unwrap();
        let arena = &mut MemoryArena::new();
        let symbols = &SymbolTable::new();
        execute(&instr, 0, regs, flags, arena, symbols).unwrap()
    }

    #[test]
    fn adds_sets_zero_flag() {
        let mut regs = RegisterFile::new();
        let mut flags = Flags::default();
        exec("adds x0,x1,x1", &mut regs, &mut flags);
        assert_eq!(regs.read(RegisterId::X0), 0);
        assert!(flags.zero);
        assert!(!flags.negative);
    }

    #[test]
    fn cmp_equal_registers_sets_zero_not_negative() {
        let mut regs = RegisterFile::new();
        regs.write(RegisterId::X1, 7);
        let mut flags = Flags::default();
        exec("cmp x1,x1", &mut regs, &mut flags);
        assert!(flags.zero);
        assert!(!flags.negative);
    }

    #[test]
    fn sdiv_by_zero_is_an_error() {
        let instr = decode(1, "sdiv x0,x1,x2").unwrap();
        let mut regs = RegisterFile::new();
        let mut flags = Flags::default();
        let mut arena = MemoryArena::new();
        let symbols = SymbolTable::new();
        let result = execute(&instr, 0, &mut regs, &mut flags, &mut arena, &symbols);
        assert!(result.is_err());
    }

    #[test]
    fn asr_sign_extends_negative_values() {
        let mut regs = RegisterFile::new();
        regs.write(RegisterId::X1, -8);
        let mut flags = Flags::default();
        exec("asr x0,x1,#1", &mut regs, &mut flags);
        assert_eq!(regs.read(RegisterId::X0), -4);
    }

    #[test]
    fn bl_writes_return_address_into_lr() {
        let instr = decode(1, "bl callee").unwrap();
        let mut regs = RegisterFile::new();
        let mut flags = Flags::default();
        let mut arena = MemoryArena::new();
        let symbols = SymbolTable::new();
        execute(&instr, 5, &mut regs, &mut flags, &mut arena, &symbols).unwrap();
        assert_eq!(regs.read(RegisterId::Lr), 5);
    }
}
