//! Hand-written tokenizer helpers shared by the section parser (C2) and the
//! instruction decoder (C5). Registers, immediates and labels are parsed
//! directly by structural inspection rather than by a prioritized regex
//! table — spec.md's pattern *priority* (immediate before register form,
//! pre/post-index anchored) becomes tokenizer disambiguation here instead
//! of match order, since the tokenizer can tell operand kinds apart on
//! sight.

use crate::register::RegisterId;
use std::str::FromStr;

/// Splits a comma-separated operand list at top level only — there is no
/// nesting in this source language beyond a single `[...]` addressing form,
/// but `stp`/`ldp` pack two registers and a bracketed base into one string,
/// so brackets are tracked to avoid splitting inside them.
pub fn split_operands(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Strips an optional leading `#` from an immediate operand.
fn strip_hash(text: &str) -> &str {
    text.strip_prefix('#').unwrap_or(text)
}

/// Parses a register operand (`x0`..`x28`, `lr`, `fp`, `sp`, `xzr`).
pub fn parse_register(text: &str) -> Option<RegisterId> {
    RegisterId::from_str(text.trim()).ok()
}

/// Parses a decimal or `0x`-prefixed integer literal, optionally negative
/// and optionally `#`-prefixed.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = strip_hash(text.trim());
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text),
    };
    if let Some(hex) = rest.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok().map(|v| sign * v)
    } else {
        rest.parse::<i64>().ok().map(|v| sign * v)
    }
}

/// A label reference: one or more leading `.` then alphanumerics/underscores.
pub fn parse_label(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let body = text.trim_start_matches('.');
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(text.to_string())
}

/// Either an immediate or a register operand, the shape shared by
/// `mov`/`add`/`sub`/`and`/`orr`/`eor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImmOrReg {
    Imm(i64),
    Reg(RegisterId),
}

pub fn parse_imm_or_reg(text: &str) -> Option<ImmOrReg> {
    if let Some(reg) = parse_register(text) {
        return Some(ImmOrReg::Reg(reg));
    }
    parse_integer(text).map(ImmOrReg::Imm)
}

/// A memory operand's addressing form, shared by `ldr`/`str`/`ldp`/`stp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressingForm {
    /// `[rn]`
    Plain(RegisterId),
    /// `[rn, #off]` or `[rn, rm]`, no base mutation.
    Offset(RegisterId, ImmOrRegOffset),
    /// `[rn, #off]!` — `rn` is updated to `rn + off` before the access.
    PreIndex(RegisterId, ImmOrRegOffset),
    /// `[rn], #off` — the access uses the old `rn`; `rn` is updated after.
    PostIndex(RegisterId, ImmOrRegOffset),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImmOrRegOffset {
    Imm(i64),
    Reg(RegisterId),
}

/// Parses `[rn]`, `[rn,#off]`, `[rn,rm]`, `[rn,#off]!`, or `[rn],#off` out
/// of a full operand string (the bracketed part plus an optional trailing
/// `,#off` for post-index).
pub fn parse_addressing_form(text: &str) -> Option<AddressingForm> {
    let text = text.trim();
    let (bracketed, trailer) = split_bracket(text)?;
    let pre_index = trailer.trim() == "!";
    let post_index_offset = trailer
        .trim()
        .strip_prefix(',')
        .map(|s| s.trim().to_string());

    let inner = bracketed.trim_start_matches('[').trim_end_matches(']');
    let mut fields = split_operands(inner).into_iter();
    let rn = parse_register(&fields.next()?)?;
    let offset_field = fields.next();

    if let Some(off_text) = post_index_offset {
        if offset_field.is_some() {
            return None;
        }
        let off = parse_imm_offset(&off_text)?;
        return Some(AddressingForm::PostIndex(rn, off));
    }

    match offset_field {
        None => Some(AddressingForm::Plain(rn)),
        Some(off_text) => {
            let off = parse_imm_offset(&off_text)?;
            if pre_index {
                Some(AddressingForm::PreIndex(rn, off))
            } else {
                Some(AddressingForm::Offset(rn, off))
            }
        }
    }
}

fn parse_imm_offset(text: &str) -> Option<ImmOrRegOffset> {
    if let Some(reg) = parse_register(text) {
        return Some(ImmOrRegOffset::Reg(reg));
    }
    parse_integer(text).map(ImmOrRegOffset::Imm)
}

/// Splits `"[x0,#8]!"` into `("[x0,#8]", "!")`, or `"[x0],#8"` into
/// `("[x0]", ",#8")`.
fn split_bracket(text: &str) -> Option<(&str, &str)> {
    let start = text.find('[')?;
    if start != 0 {
        return None;
    }
    let end = text.find(']')?;
    Some((&text[..=end], &text[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_operands() {
        assert_eq!(
            split_operands("x0, x1, x2"),
            vec!["x0".to_string(), "x1".to_string(), "x2".to_string()]
        );
    }

    #[test]
    fn splits_operands_around_bracket() {
        assert_eq!(
            split_operands("x1, [x2, #8]"),
            vec!["x1".to_string(), "[x2, #8]".to_string()]
        );
    }

    #[test]
    fn parses_hex_and_decimal_and_negative() {
        assert_eq!(parse_integer("#0x10"), Some(16));
        assert_eq!(parse_integer("10"), Some(10));
        assert_eq!(parse_integer("-10"), Some(-10));
    }

    #[test]
    fn register_does_not_match_hex_literal() {
        assert_eq!(parse_register("0x40"), None);
    }

    #[test]
    fn parses_plain_offset_pre_and_post_index() {
        assert_eq!(
            parse_addressing_form("[x1]"),
            Some(AddressingForm::Plain(RegisterId::X1))
        );
        assert_eq!(
            parse_addressing_form("[x1,#8]"),
            Some(AddressingForm::Offset(RegisterId::X1, ImmOrRegOffset::Imm(8)))
        );
        assert_eq!(
            parse_addressing_form("[x1,#8]!"),
            Some(AddressingForm::PreIndex(
                RegisterId::X1,
                ImmOrRegOffset::Imm(8)
            ))
        );
        assert_eq!(
            parse_addressing_form("[x1],#8"),
            Some(AddressingForm::PostIndex(
                RegisterId::X1,
                ImmOrRegOffset::Imm(8)
            ))
        );
    }

    #[test]
    fn parses_register_offset_form() {
        assert_eq!(
            parse_addressing_form("[x1,x2]"),
            Some(AddressingForm::Offset(RegisterId::X1, ImmOrRegOffset::Reg(RegisterId::X2)))
        );
    }

    #[test]
    fn label_requires_leading_dots_then_word_chars() {
        assert_eq!(parse_label("loop1"), Some("loop1".to_string()));
        assert_eq!(parse_label(".l_done"), Some(".l_done".to_string()));
        assert_eq!(parse_label("#10"), None);
    }
}
