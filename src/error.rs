//! Error types for every stage of parsing, static analysis and execution.
//!
//! Follows the flat-enum-with-manual-`Display` idiom `vasm/src/error.rs`
//! uses upstream, rather than pulling in `thiserror`: no crate in this
//! lineage reaches for it, so none is introduced here either.

use std::fmt;

/// Failure while turning raw source text into a parsed program (C2).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// A `.data`/`.bss` line didn't match any recognized directive form.
    MalformedDirective { line: usize, text: String },
    /// `name = . - other` or `name = other` referenced an undeclared symbol.
    UnknownSymbol { line: usize, name: String },
    /// An integer literal couldn't be parsed (bad `0x` form, overflow, ...).
    BadInteger { line: usize, text: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::MalformedDirective { line, text } => {
                write!(f, "line {}: malformed directive: \"{}\"", line, text)
            }
            ParseError::UnknownSymbol { line, name } => {
                write!(f, "line {}: unknown symbol \"{}\"", line, name)
            }
            ParseError::BadInteger { line, text } => {
                write!(f, "line {}: not an integer literal: \"{}\"", line, text)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// A program-level rule (C7) the static analyzer rejected before execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StaticRuleViolation {
    EmptyProgram,
    DuplicateLabel(String),
    ForbiddenMnemonic(String),
    UnknownBranchTarget { line: usize, label: String },
    LoopDetected { line: usize, label: String },
    DeadCode { line: usize },
}

impl fmt::Display for StaticRuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StaticRuleViolation::EmptyProgram => write!(f, "program contains no code"),
            StaticRuleViolation::DuplicateLabel(label) => {
                write!(f, "label \"{}\" is declared more than once", label)
            }
            StaticRuleViolation::ForbiddenMnemonic(mnemonic) => {
                write!(f, "mnemonic \"{}\" is forbidden", mnemonic)
            }
            StaticRuleViolation::UnknownBranchTarget { line, label } => write!(
                f,
                "line {}: branch target \"{}\" does not exist",
                line, label
            ),
            StaticRuleViolation::LoopDetected { line, label } => write!(
                f,
                "line {}: branch to earlier label \"{}\" forms a loop",
                line, label
            ),
            StaticRuleViolation::DeadCode { line } => {
                write!(f, "line {}: unreachable instruction after ret/b", line)
            }
        }
    }
}

impl std::error::Error for StaticRuleViolation {}

/// A program-level rule the main loop rejected dynamically, after execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DynamicRuleViolation {
    RecursionForbidden(String),
    RecursionRequired,
    RequiredRecursiveLabelMissing(String),
}

impl fmt::Display for DynamicRuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DynamicRuleViolation::RecursionForbidden(label) => {
                write!(f, "label \"{}\" recursed, but recursion is forbidden", label)
            }
            DynamicRuleViolation::RecursionRequired => {
                write!(f, "program never recursed, but recursion is required")
            }
            DynamicRuleViolation::RequiredRecursiveLabelMissing(label) => write!(
                f,
                "label \"{}\" was required to recurse but never did",
                label
            ),
        }
    }
}

impl std::error::Error for DynamicRuleViolation {}

/// Every way a parsed program can fail before or during a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineError {
    Parse(ParseError),
    StaticRule(StaticRuleViolation),
    OutOfBoundsMemoryAccess { address: i64, width: usize },
    StackOverflow,
    StackUnderflow,
    SyntaxOrUnsupportedInstruction { line: usize, text: String },
    UnsupportedSyscall(i64),
    DynamicRule(DynamicRuleViolation),
    InvalidReturn { lr: i64 },
    InvalidFileDescriptor(i64),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::Parse(e) => write!(f, "parse error: {}", e),
            EngineError::StaticRule(e) => write!(f, "static rule violation: {}", e),
            EngineError::OutOfBoundsMemoryAccess { address, width } => write!(
                f,
                "out-of-bounds memory access at {} (width {})",
                address, width
            ),
            EngineError::StackOverflow => write!(f, "stack overflow"),
            EngineError::StackUnderflow => write!(f, "stack underflow"),
            EngineError::SyntaxOrUnsupportedInstruction { line, text } => write!(
                f,
                "line {}: unsupported instruction or syntax error: \"{}\"",
                line, text
            ),
            EngineError::UnsupportedSyscall(n) => write!(f, "unsupported syscall number {}", n),
            EngineError::DynamicRule(e) => write!(f, "dynamic rule violation: {}", e),
            EngineError::InvalidReturn { lr } => {
                write!(f, "ret with lr ({}) out of instruction range", lr)
            }
            EngineError::InvalidFileDescriptor(fd) => {
                write!(f, "write requires x0 == 1 (stdout), got {}", fd)
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> EngineError {
        EngineError::Parse(err)
    }
}

impl From<StaticRuleViolation> for EngineError {
    fn from(err: StaticRuleViolation) -> EngineError {
        EngineError::StaticRule(err)
    }
}

impl From<DynamicRuleViolation> for EngineError {
    fn from(err: DynamicRuleViolation) -> EngineError {
        EngineError::DynamicRule(err)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
