//! C2: the section parser. Consumes the canonicalized lines produced by
//! [`crate::lexer::preprocess`] and builds the instruction list, the
//! symbol table and the static prefix of the memory arena.
//!
//! Directive matching uses `regex` + a `once_cell::sync::Lazy` cache per
//! pattern, the way `examples/amoljassal-sis-kernel-showcase`'s UART parser
//! does it — the teacher repo has no analogous text-directive parser to
//! imitate, so this concern is sourced from elsewhere in the retrieval pack.

use crate::error::ParseError;
use crate::memory::MemoryArena;
use crate::symbol::{DataType, Symbol, SymbolTable};
use once_cell::sync::Lazy;
use regex::Regex;

static ASCIZ_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([.\w]+):\.asciz (.*)$").unwrap());
static WORDS8_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([.\w]+):\.8byte(.*)$").unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([.\w]+):\.space(.+)$").unwrap());
static SIZEOF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([.\w]+)=\.-([.\w]+)$").unwrap());
static ASSIGN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([.\w]+)=(.+)$").unwrap());
static LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[._]*[a-z0-9_]+:$").unwrap());

#[derive(Clone, Copy, PartialEq, Eq)]
enum Region {
    Data,
    Bss,
    Code,
}

pub struct ParsedProgram {
    pub instructions: Vec<String>,
    pub symbols: SymbolTable,
    pub arena: MemoryArena,
}

/// Un-escapes `\n`, `\t`, `\r` inside an `.asciz` literal.
fn unescape(literal: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some('n') => {
                    out.push(b'\n');
                    chars.next();
                }
                Some('t') => {
                    out.push(b'\t');
                    chars.next();
                }
                Some('r') => {
                    out.push(b'\r');
                    chars.next();
                }
                _ => out.push(ch as u8),
            }
        } else {
            out.extend_from_slice(ch.to_string().as_bytes());
        }
    }
    out
}

/// Strips quote characters, then collapses whitespace that surrounds
/// `:`, `.`, `-`, `=` — the normalization spec.md §4.2 prescribes for
/// `.data`/`.bss` lines, leaving string-literal text otherwise intact.
/// Spaces are dropped only *before* `:` and `.` (so that
/// `name: .asciz "a b"` isn't disturbed past the colon/period), but on
/// *both* sides of `-` and `=`, matching the original's `-`/`=` regexes
/// collapsing fully down to the bare separator.
fn normalize_directive_line(line: &str) -> String {
    let without_quotes: String = line.chars().filter(|&c| c != '"').collect();
    let mut s = without_quotes;
    for sep in [':', '.', '-', '='] {
        s = strip_spaces_before(&s, sep);
    }
    for sep in ['-', '='] {
        s = strip_spaces_after(&s, sep);
    }
    s
}

fn strip_spaces_before(s: &str, sep: char) -> String {
    let mut collapsed = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == ' ' {
            let mut lookahead = chars.clone();
            let mut saw_sep = false;
            while let Some(&next) = lookahead.peek() {
                if next == ' ' {
                    lookahead.next();
                    continue;
                }
                saw_sep = next == sep;
                break;
            }
            if saw_sep {
                continue;
            }
        }
        collapsed.push(ch);
    }
    collapsed
}

fn strip_spaces_after(s: &str, sep: char) -> String {
    let mut collapsed = String::with_capacity(s.len());
    let mut prev_was_sep = false;
    for ch in s.chars() {
        if ch == ' ' && prev_was_sep {
            continue;
        }
        prev_was_sep = ch == sep;
        collapsed.push(ch);
    }
    collapsed
}

fn parse_integer_literal(line: usize, text: &str) -> Result<i64, ParseError> {
    let text = text.trim();
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else {
        rest.parse::<i64>().ok()
    };
    value.map(|v| sign * v).ok_or_else(|| ParseError::BadInteger {
        line,
        text: text.to_string(),
    })
}

/// Parses a data/bss line already known not to be blank. Advances `index`
/// (the running static-data cursor) and records symbols as it goes.
fn parse_directive_line(
    line_no: usize,
    raw: &str,
    symbols: &mut SymbolTable,
    arena: &mut MemoryArena,
) -> Result<(), ParseError> {
    let normalized = normalize_directive_line(raw);

    if let Some(caps) = ASCIZ_RE.captures(&normalized) {
        let name = caps[1].to_string();
        let bytes = unescape(&caps[2]);
        let offset = arena.push_static(&bytes);
        log::debug!("asciz {} at offset {} ({} bytes)", name, offset, bytes.len());
        symbols.insert(
            name,
            Symbol::Address {
                offset,
                size: bytes.len(),
                ty: DataType::Asciz,
            },
        );
        return Ok(());
    }

    if let Some(caps) = WORDS8_RE.captures(&normalized) {
        let name = caps[1].to_string();
        let mut bytes = Vec::new();
        for field in caps[2].split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let value = parse_integer_literal(line_no, field)?;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let offset = arena.push_static(&bytes);
        symbols.insert(
            name,
            Symbol::Address {
                offset,
                size: bytes.len(),
                ty: DataType::Words8,
            },
        );
        return Ok(());
    }

    if let Some(caps) = SPACE_RE.captures(&normalized) {
        let name = caps[1].to_string();
        let expr = caps[2].trim();
        let size = match symbols.size_of(expr) {
            Some(size) => size,
            None => parse_integer_literal(line_no, expr)? as usize,
        };
        let offset = arena.push_static(&vec![0u8; size]);
        symbols.insert(
            name,
            Symbol::Address {
                offset,
                size,
                ty: DataType::Space,
            },
        );
        return Ok(());
    }

    if let Some(caps) = SIZEOF_RE.captures(&normalized) {
        let name = caps[1].to_string();
        let other = &caps[2];
        let size = symbols
            .size_of(other)
            .ok_or_else(|| ParseError::UnknownSymbol {
                line: line_no,
                name: other.to_string(),
            })?;
        symbols.insert(name, Symbol::Literal(size as i64));
        return Ok(());
    }

    if let Some(caps) = ASSIGN_RE.captures(&normalized) {
        let name = caps[1].to_string();
        let rhs = &caps[2];
        let value = match symbols.get(rhs) {
            Some(Symbol::Literal(v)) => *v,
            Some(Symbol::Address { offset, .. }) => *offset as i64,
            None => parse_integer_literal(line_no, rhs)?,
        };
        symbols.insert(name, Symbol::Literal(value));
        return Ok(());
    }

    Err(ParseError::MalformedDirective {
        line: line_no,
        text: raw.to_string(),
    })
}

pub fn is_label_line(line: &str) -> bool {
    LABEL_RE.is_match(line)
}

/// Runs C2 over lines already preprocessed by C1.
pub fn parse_sections(lines: &[String]) -> Result<ParsedProgram, ParseError> {
    let mut region = Region::Code;
    let mut instructions = Vec::new();
    let mut symbols = SymbolTable::new();
    let mut arena = MemoryArena::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if line == ".data" {
            log::debug!("entering .data section at line {}", line_no);
            region = Region::Data;
            continue;
        }
        if line == ".bss" {
            log::debug!("entering .bss section at line {}", line_no);
            region = Region::Bss;
            continue;
        }
        if line == "main:" || line == "_start:" {
            log::debug!("entering code section at line {}", line_no);
            region = Region::Code;
            continue;
        }
        match region {
            Region::Code => {
                instructions.push(line.clone());
            }
            Region::Data | Region::Bss => {
                parse_directive_line(line_no, line, &mut symbols, &mut arena)?;
            }
        }
    }

    arena.finalize();

    Ok(ParsedProgram {
        instructions,
        symbols,
        arena,
    })
}
