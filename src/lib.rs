//! A small interpreting simulator for a subset of AArch64 user-mode
//! assembly, plus the Linux-style syscalls and static analysis rules a
//! teaching tool needs around it.
//!
//! Pipeline: [`lexer`] (C1, comment/case folding) feeds [`parser`] (C2,
//! sections/directives), which produces a [`symbol::SymbolTable`] and a
//! [`memory::MemoryArena`] alongside the raw instruction lines.
//! [`instruction::decode`] turns each line into a typed [`instruction::Instruction`],
//! [`analyzer`] runs the opt-in static rules (C7) over the decoded program,
//! and [`engine::Engine`] drives the run loop (C8), dispatching [`syscall`]
//! effects and executing each step through [`executor`].

pub mod analyzer;
pub mod constants;
pub mod engine;
pub mod error;
pub mod executor;
pub mod instruction;
pub mod lexer;
pub mod memory;
pub mod operand;
pub mod parser;
pub mod register;
pub mod symbol;
pub mod syscall;

pub use engine::{DataView, Engine};
pub use error::{EngineError, Result};
