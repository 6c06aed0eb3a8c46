//! C8 (main loop) plus the `Engine` value spec.md §9 asks for: one struct
//! owning everything the distilled source keeps as module-level globals
//! (registers, arena, symbol table, flags, pc, label bookkeeping).
//! `reset()` is "drop and recreate" exactly as §9 directs.

use crate::analyzer::{check_static_rules, StaticRuleConfig};
use crate::error::{DynamicRuleViolation, EngineError};
use crate::executor::{self, ExecOutcome};
use crate::instruction::{decode, Instruction};
use crate::lexer::preprocess;
use crate::memory::MemoryArena;
use crate::parser::parse_sections;
use crate::register::{Flags, RegisterFile, RegisterId};
use crate::symbol::{DataType, Symbol, SymbolTable};
use crate::syscall::{self, HostIo, SYS_BRK, SYS_EXIT, SYS_GETRANDOM, SYS_READ, SYS_WRITE};
use std::collections::{HashMap, HashSet};

/// A host-side procedure invoked by `bl` against a linked label. Receives
/// the register file so it can read arguments (by convention `x1`, `x2`,
/// ...) and write a return value into `x0`.
pub type LinkedLabel = Box<dyn FnMut(&mut RegisterFile)>;

/// A value returned by [`Engine::data_of`] (C9), shaped by the symbol's
/// `_TYPE_` shadow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataView {
    Text(String),
    Words(Vec<i64>),
    Bytes(Vec<u8>),
    Literal(i64),
}

pub struct Engine<H: HostIo> {
    rules: StaticRuleConfig,
    host_io: H,
    linked_labels: HashMap<String, LinkedLabel>,

    registers: RegisterFile,
    flags: Flags,
    pc: usize,
    arena: MemoryArena,
    symbols: SymbolTable,
    raw_lines: Vec<String>,
    instructions: Vec<Instruction>,
    label_index: HashMap<String, usize>,
    label_hit_counts: HashMap<String, u64>,
    recursed_labels: HashSet<String>,
}

fn strip_colon(label: &str) -> &str {
    label.strip_suffix(':').unwrap_or(label)
}

impl<H: HostIo> Engine<H> {
    pub fn new(rules: StaticRuleConfig, host_io: H) -> Engine<H> {
        Engine {
            rules,
            host_io,
            linked_labels: HashMap::new(),
            registers: RegisterFile::new(),
            flags: Flags::default(),
            pc: 0,
            arena: MemoryArena::new(),
            symbols: SymbolTable::new(),
            raw_lines: Vec::new(),
            instructions: Vec::new(),
            label_index: HashMap::new(),
            label_hit_counts: HashMap::new(),
            recursed_labels: HashSet::new(),
        }
    }

    /// Registers a host-side callback the guest invokes with `bl label`.
    /// `label` may be given with or without its trailing `:`.
    pub fn link_label(&mut self, label: &str, callback: impl FnMut(&mut RegisterFile) + 'static) {
        self.linked_labels
            .insert(strip_colon(label).to_string(), Box::new(callback));
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn label_hit_counts(&self) -> &HashMap<String, u64> {
        &self.label_hit_counts
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Access to the host I/O capability, e.g. to inspect a scripted host's
    /// captured output or feed it fresh input between runs.
    pub fn host_io(&self) -> &H {
        &self.host_io
    }

    pub fn host_io_mut(&mut self) -> &mut H {
        &mut self.host_io
    }

    /// C9: the data accessor. `name` is a bare symbol name (no shadow suffix).
    pub fn data_of(&self, name: &str) -> Option<DataView> {
        match self.symbols.get(name) {
            Some(Symbol::Literal(v)) => Some(DataView::Literal(*v)),
            Some(Symbol::Address { offset, size, ty }) => {
                let bytes = self.arena.read_bytes(*offset as i64, *size).ok()?;
                Some(match ty {
                    DataType::Asciz => {
                        DataView::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                    DataType::Words8 => DataView::Words(
                        bytes
                            .chunks_exact(8)
                            .map(|c| {
                                let mut buf = [0u8; 8];
                                buf.copy_from_slice(c);
                                i64::from_le_bytes(buf)
                            })
                            .collect(),
                    ),
                    DataType::Space => DataView::Bytes(bytes.to_vec()),
                })
            }
            None => None,
        }
    }

    /// Runs C1 + C2 + C7 over `source`, populating this engine's state.
    /// Any previously parsed program is replaced.
    pub fn parse(&mut self, source: &str) -> Result<(), EngineError> {
        let lines = preprocess(source);
        let program = parse_sections(&lines).map_err(|e| {
            log::error!("parse failed: {}", e);
            EngineError::from(e)
        })?;

        let mut instructions = Vec::with_capacity(program.instructions.len());
        let mut label_index = HashMap::new();
        for (idx, line) in program.instructions.iter().enumerate() {
            let instr = decode(idx + 1, line).map_err(|e| {
                log::error!("decode failed: {}", e);
                e
            })?;
            if let Instruction::Label(text) = &instr {
                label_index.insert(strip_colon(text).to_string(), idx);
            }
            instructions.push(instr);
        }

        let linked_names: HashSet<String> = self.linked_labels.keys().cloned().collect();
        check_static_rules(
            &instructions,
            &program.instructions,
            &label_index,
            &linked_names,
            &self.rules,
        )
        .map_err(|e| {
            log::warn!("static rule violation: {}", e);
            EngineError::from(e)
        })?;
        log::debug!("parsed {} instructions, {} labels", instructions.len(), label_index.len());

        let mut label_hit_counts = HashMap::new();
        for name in label_index.keys().chain(linked_names.iter()) {
            label_hit_counts.insert(name.clone(), 0);
        }

        let initial_sp = program.arena.arena_len() as i64 - 1;

        self.arena = program.arena;
        self.symbols = program.symbols;
        self.raw_lines = program.instructions;
        self.instructions = instructions;
        self.label_index = label_index;
        self.label_hit_counts = label_hit_counts;
        self.recursed_labels = HashSet::new();
        self.registers = RegisterFile::new();
        self.registers.write(RegisterId::Sp, initial_sp);
        self.flags = Flags::default();
        self.pc = 0;

        Ok(())
    }

    /// Drops all parsed/runtime state, keeping the static-rule configuration
    /// and linked labels (host-supplied, not parsed).
    pub fn reset(&mut self) {
        self.registers = RegisterFile::new();
        self.flags = Flags::default();
        self.pc = 0;
        self.arena = MemoryArena::new();
        self.symbols = SymbolTable::new();
        self.raw_lines = Vec::new();
        self.instructions = Vec::new();
        self.label_index = HashMap::new();
        self.label_hit_counts = HashMap::new();
        self.recursed_labels = HashSet::new();
    }

    fn jump_to_label(&mut self, label: &str) -> Result<(), EngineError> {
        match self.label_index.get(label) {
            Some(&idx) => {
                self.pc = idx;
                Ok(())
            }
            None => Err(EngineError::SyntaxOrUnsupportedInstruction {
                line: self.pc + 1,
                text: format!("branch to unknown label {}", label),
            }),
        }
    }

    /// C6: dispatch on `x8` for `svc 0`.
    fn dispatch_syscall(&mut self) -> Result<ExecOutcome, EngineError> {
        let number = self.registers.read(RegisterId::X8);
        match number {
            SYS_EXIT => Ok(ExecOutcome::Exit),
            SYS_WRITE => {
                let fd = self.registers.read(RegisterId::X0);
                if fd != 1 {
                    return Err(EngineError::InvalidFileDescriptor(fd));
                }
                let addr = self.registers.read(RegisterId::X1);
                let len = self.registers.read(RegisterId::X2) as usize;
                let bytes = self.arena.read_bytes(addr, len)?.to_vec();
                self.host_io
                    .write_bytes(&bytes)
                    .map_err(|_| EngineError::OutOfBoundsMemoryAccess { address: addr, width: len })?;
                Ok(ExecOutcome::Next)
            }
            SYS_READ => {
                let addr = self.registers.read(RegisterId::X1);
                let max_len = self.registers.read(RegisterId::X2) as usize;
                let mut line = self
                    .host_io
                    .read_line()
                    .map_err(|_| EngineError::OutOfBoundsMemoryAccess { address: addr, width: max_len })?;
                line.push('\n');
                line.truncate(max_len);
                self.arena.write_bytes(addr, line.as_bytes())?;
                self.registers.write(RegisterId::X0, line.len() as i64);
                Ok(ExecOutcome::Next)
            }
            SYS_BRK => {
                let requested = self.registers.read(RegisterId::X0);
                let result = self.arena.set_brk(requested)?;
                self.registers.write(RegisterId::X0, result);
                Ok(ExecOutcome::Next)
            }
            SYS_GETRANDOM => {
                let addr = self.registers.read(RegisterId::X0);
                let quantity = self.registers.read(RegisterId::X1) as usize;
                let mut buf = vec![0u8; quantity];
                self.host_io.fill_random(&mut buf);
                self.arena.write_bytes(addr, &buf)?;
                self.registers.write(RegisterId::X0, quantity as i64);
                Ok(ExecOutcome::Next)
            }
            other => Err(syscall::unsupported(other)),
        }
    }

    /// C8: the main loop.
    pub fn run(&mut self) -> Result<(), EngineError> {
        while self.pc < self.instructions.len() {
            let sp = self.registers.read(RegisterId::Sp);
            if sp <= self.arena.heap_ptr() as i64 {
                return Err(EngineError::StackOverflow);
            }
            if sp > self.arena.arena_len() as i64 {
                return Err(EngineError::StackUnderflow);
            }

            let instr = self.instructions[self.pc].clone();

            if let Instruction::Label(text) = &instr {
                let name = strip_colon(text).to_string();
                *self.label_hit_counts.entry(name).or_insert(0) += 1;
                self.pc += 1;
                continue;
            }

            if let Instruction::Bl { label } = &instr {
                if self.pc as i64 == self.registers.read(RegisterId::Lr) {
                    self.recursed_labels.insert(label.clone());
                }
            }

            let outcome = if matches!(instr, Instruction::Svc) {
                log::debug!("svc dispatch: x8={}", self.registers.read(RegisterId::X8));
                self.dispatch_syscall()?
            } else {
                executor::execute(
                    &instr,
                    self.pc,
                    &mut self.registers,
                    &mut self.flags,
                    &mut self.arena,
                    &self.symbols,
                )?
            };

            match outcome {
                ExecOutcome::Next => {
                    self.pc += 1;
                }
                ExecOutcome::Jump(label) => {
                    self.jump_to_label(&label)?;
                }
                ExecOutcome::Bl(label) => {
                    *self.label_hit_counts.entry(label.clone()).or_insert(0) += 1;
                    if self.linked_labels.contains_key(&label) {
                        let callback = self.linked_labels.get_mut(&label).unwrap();
                        callback(&mut self.registers);
                        self.pc += 1;
                    } else {
                        self.jump_to_label(&label)?;
                    }
                }
                ExecOutcome::Return => {
                    let lr = self.registers.read(RegisterId::Lr);
                    if lr < 0 || lr as usize > self.instructions.len() {
                        return Err(EngineError::InvalidReturn { lr });
                    }
                    self.pc = lr as usize;
                }
                ExecOutcome::Exit => {
                    self.pc = self.instructions.len();
                }
            }

            self.registers.clear_xzr();
        }

        if self.rules.forbid_recursion && !self.recursed_labels.is_empty() {
            let any = self.recursed_labels.iter().next().unwrap().clone();
            let violation = DynamicRuleViolation::RecursionForbidden(any);
            log::warn!("dynamic rule violation: {}", violation);
            return Err(violation.into());
        }
        if self.rules.require_recursion && self.recursed_labels.is_empty() {
            log::warn!("dynamic rule violation: {}", DynamicRuleViolation::RecursionRequired);
            return Err(DynamicRuleViolation::RecursionRequired.into());
        }
        for required in &self.rules.recursive_labels {
            if !self.recursed_labels.contains(required) {
                let violation = DynamicRuleViolation::RequiredRecursiveLabelMissing(required.clone());
                log::warn!("dynamic rule violation: {}", violation);
                return Err(violation.into());
            }
        }

        log::debug!("run completed, x0={}", self.registers.read(RegisterId::X0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test_support::ScriptedHostIo;

    fn engine() -> Engine<ScriptedHostIo> {
        Engine::new(StaticRuleConfig::default(), ScriptedHostIo::default())
    }

    #[test]
    fn arithmetic_scenario() {
        let mut e = engine();
        e.parse("mov x0,#2\nmov x1,#5\nadd x0,x0,x1\nsub x0,x0,#0").unwrap();
        e.run().unwrap();
        assert_eq!(e.registers().read(RegisterId::X0), 7);
        assert!(!e.flags().zero);
        assert!(!e.flags().negative);
    }

    #[test]
    fn branching_scenario() {
        let mut e = engine();
        e.parse("mov x0,#0\nmov x1,#1\ncmp x1,#1\nb.eq skip\nmov x0,#99\nskip:\nadd x0,x0,#7")
            .unwrap();
        e.run().unwrap();
        assert_eq!(e.registers().read(RegisterId::X0), 7);
    }

    #[test]
    fn load_store_pair_scenario() {
        let mut e = engine();
        e.parse(
            ".data\nbuf:.space 32\nmain:\nldr x1,=buf\nmov x2,#3\nmov x3,#4\nstp x2,x3,[x1]\nldp x4,x5,[x1]\nadd x0,x4,x5",
        )
        .unwrap();
        e.run().unwrap();
        assert_eq!(e.registers().read(RegisterId::X0), 7);
    }

    #[test]
    fn forbidden_mnemonic_fails_before_running() {
        let mut rules = StaticRuleConfig::default();
        rules.forbidden_mnemonics.insert("mov".to_string());
        let mut e = Engine::new(rules, ScriptedHostIo::default());
        let result = e.parse("mov x0,#1");
        assert!(result.is_err());
    }

    #[test]
    fn forbid_recursion_fails_after_run_when_recursion_happens() {
        // `ret` sets pc back to the very `bl` that got it here, not to the
        // instruction after it, so a single `bl`/`ret` pair re-enters the
        // same call site on every `ret` until a branch escapes the loop
        // (see the `pc == lr` heuristic in `run`). x1 starting above 1
        // guarantees that site is entered at least twice before `cbz`
        // escapes to `done`, so the heuristic sees it.
        let mut rules = StaticRuleConfig::default();
        rules.forbid_recursion = true;
        let mut e = Engine::new(rules, ScriptedHostIo::default());
        e.parse("mov x1,#3\nbl count\ncount:\nsub x1,x1,#1\ncbz x1,done\nret\ndone:")
            .unwrap();
        let result = e.run();
        assert!(result.is_err());
    }

    #[test]
    fn empty_data_section_still_runs() {
        let mut e = engine();
        e.parse("mov x0,#1").unwrap();
        assert_eq!(e.arena().data_ptr(), 0);
        e.run().unwrap();
    }

    #[test]
    fn linked_label_invokes_host_callback() {
        use std::cell::Cell;
        use std::rc::Rc;

        let seen = Rc::new(Cell::new(0i64));
        let seen_clone = Rc::clone(&seen);

        let mut e = engine();
        e.link_label("printx1:", move |regs| {
            seen_clone.set(regs.read(RegisterId::X1));
        });
        e.parse("mov x1,#42\nbl printx1").unwrap();
        e.run().unwrap();
        assert_eq!(seen.get(), 42);
        assert_eq!(*e.label_hit_counts().get("printx1").unwrap(), 1);
    }

    #[test]
    fn svc_write_emits_bytes_via_host_io() {
        let mut e = engine();
        e.parse(
            ".data\nbuf:.space 8\nmain:\nldr x1,=buf\nmov x0,#1\nmov x2,#3\nmov x8,#64\nsvc 0",
        )
        .unwrap();
        e.run().unwrap();
        assert_eq!(e.host_io().output, vec![0u8, 0, 0]);
    }

    #[test]
    fn svc_write_rejects_non_stdout_descriptor() {
        let mut e = engine();
        e.parse(".data\nbuf:.space 8\nmain:\nldr x1,=buf\nmov x0,#2\nmov x2,#3\nmov x8,#64\nsvc 0")
            .unwrap();
        assert!(matches!(
            e.run(),
            Err(EngineError::InvalidFileDescriptor(2))
        ));
    }

    #[test]
    fn svc_read_fills_buffer_and_reports_length() {
        let mut e = engine();
        e.host_io_mut().input_lines.push_back("hi".to_string());
        e.parse(".data\nbuf:.space 8\nmain:\nldr x1,=buf\nmov x2,#8\nmov x8,#63\nsvc 0")
            .unwrap();
        e.run().unwrap();
        assert_eq!(e.registers().read(RegisterId::X0), 3);
        assert_eq!(e.arena().read_bytes(0, 3).unwrap(), b"hi\n");
    }

    #[test]
    fn svc_getrandom_fills_buffer_from_host_io() {
        let mut e = engine();
        e.parse(".data\nbuf:.space 8\nmain:\nldr x0,=buf\nmov x1,#4\nmov x8,#278\nsvc 0")
            .unwrap();
        e.run().unwrap();
        assert_eq!(e.registers().read(RegisterId::X0), 4);
        assert_eq!(e.arena().read_bytes(0, 4).unwrap(), &[0u8, 1, 2, 3]);
    }
}
