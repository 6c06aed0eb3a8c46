//! The flat guest memory arena (C3): static data, heap and stack sharing one
//! contiguous byte buffer.
//!
//! Shaped after the teacher's `Storage` trait
//! (`examples/snacchus-vcpu/src/memory.rs`): byte-granular
//! `borrow_slice`/`borrow_slice_mut` primitives with doc-tested
//! `read_i64`/`write_i64` convenience methods built on top, generalized from
//! 4-byte little-endian words to 8-byte ones and from `Result<_, ()>` to
//! [`EngineError`].

use crate::constants::{BRK_PAGE_SIZE, HEAP_CAPACITY, STACK_CAPACITY, WORD_BYTES};
use crate::error::EngineError;
use byteorder::{ByteOrder, LittleEndian};

/// Where an access falls relative to the brk/stack-pointer gap.
enum Region {
    DataOrHeap,
    Stack,
}

pub struct MemoryArena {
    data: Vec<u8>,
    data_ptr: usize,
    brk: usize,
    heap_ptr: usize,
}

impl MemoryArena {
    /// An arena under construction during parsing: no heap/stack appended yet.
    pub fn new() -> MemoryArena {
        MemoryArena {
            data: Vec::new(),
            data_ptr: 0,
            brk: 0,
            heap_ptr: 0,
        }
    }

    /// Appends static bytes during C2 parsing; returns the offset they start at.
    pub fn push_static(&mut self, bytes: &[u8]) -> usize {
        let start = self.data.len();
        self.data.extend_from_slice(bytes);
        start
    }

    /// Current length of the static prefix being built, before `finalize`.
    pub fn static_len(&self) -> usize {
        self.data.len()
    }

    /// Ends the parse phase: fixes `data_ptr`/`brk`/`heap_ptr` at the current
    /// length, then appends `heap_capacity + stack_capacity` zero bytes.
    /// Returns the initial stack pointer value, `arena_len - 1`.
    pub fn finalize(&mut self) -> i64 {
        self.data_ptr = self.data.len();
        self.brk = self.data_ptr;
        self.heap_ptr = self.data_ptr;
        self.data
            .resize(self.data_ptr + HEAP_CAPACITY + STACK_CAPACITY, 0);
        (self.data.len() - 1) as i64
    }

    pub fn arena_len(&self) -> usize {
        self.data.len()
    }

    pub fn data_ptr(&self) -> usize {
        self.data_ptr
    }

    pub fn brk(&self) -> usize {
        self.brk
    }

    pub fn heap_ptr(&self) -> usize {
        self.heap_ptr
    }

    fn classify(&self, address: usize, width: usize, sp: i64) -> Result<Region, EngineError> {
        if address + width <= self.brk {
            Ok(Region::DataOrHeap)
        } else if sp >= 0 && address as i64 >= sp {
            Ok(Region::Stack)
        } else {
            Err(EngineError::OutOfBoundsMemoryAccess {
                address: address as i64,
                width,
            })
        }
    }

    /// Checks bounds and the brk/stack-pointer gap rule shared by every
    /// load and store; `sp` is the caller's current stack pointer value.
    fn check_access(&self, address: i64, width: usize, sp: i64) -> Result<usize, EngineError> {
        if address < 0 {
            return Err(EngineError::OutOfBoundsMemoryAccess { address, width });
        }
        let address = address as usize;
        if address + width > self.arena_len() {
            return Err(EngineError::OutOfBoundsMemoryAccess {
                address: address as i64,
                width,
            });
        }
        self.classify(address, width, sp)?;
        Ok(address)
    }

    fn borrow_slice(&self, address: i64, width: usize, sp: i64) -> Result<&[u8], EngineError> {
        let address = self.check_access(address, width, sp)?;
        Ok(&self.data[address..address + width])
    }

    fn borrow_slice_mut(
        &mut self,
        address: i64,
        width: usize,
        sp: i64,
    ) -> Result<&mut [u8], EngineError> {
        let address = self.check_access(address, width, sp)?;
        Ok(&mut self.data[address..address + width])
    }

    /// Reads a little-endian 64-bit word at `address`.
    ///
    /// # Examples
    ///
    /// ```
    /// use armsim::memory::MemoryArena;
    ///
    /// let mut arena = MemoryArena::new();
    /// arena.push_static(&[0u8; 8]);
    /// arena.finalize();
    /// arena.write_i64(0, 42, 0).unwrap();
    /// assert_eq!(arena.read_i64(0, 0).unwrap(), 42);
    /// ```
    pub fn read_i64(&self, address: i64, sp: i64) -> Result<i64, EngineError> {
        let slice = self.borrow_slice(address, WORD_BYTES, sp)?;
        Ok(LittleEndian::read_u64(slice) as i64)
    }

    /// Writes the low 8 bytes of `value`'s two's-complement form, little-endian.
    pub fn write_i64(&mut self, address: i64, value: i64, sp: i64) -> Result<(), EngineError> {
        let slice = self.borrow_slice_mut(address, WORD_BYTES, sp)?;
        LittleEndian::write_u64(slice, value as u64);
        Ok(())
    }

    /// Reads `len` raw bytes at `address`, bypassing the stack-pointer gap
    /// check (used for syscall buffers, which only ever target static/heap).
    pub fn read_bytes(&self, address: i64, len: usize) -> Result<&[u8], EngineError> {
        self.borrow_slice(address, len, i64::MAX)
    }

    pub fn write_bytes(&mut self, address: i64, bytes: &[u8]) -> Result<(), EngineError> {
        let slice = self.borrow_slice_mut(address, bytes.len(), i64::MAX)?;
        slice.copy_from_slice(bytes);
        Ok(())
    }

    /// Implements the `brk` syscall (214): see spec for the three cases.
    pub fn set_brk(&mut self, requested: i64) -> Result<i64, EngineError> {
        let data_ptr = self.data_ptr as i64;
        if requested < data_ptr {
            return Ok(self.brk as i64);
        }
        if requested == data_ptr {
            self.brk = self.data_ptr;
            self.heap_ptr = self.data_ptr;
            return Ok(self.brk as i64);
        }
        let page = BRK_PAGE_SIZE as i64;
        let rounded = ((requested + page - 1) / page) * page;
        if (rounded - data_ptr) as usize > HEAP_CAPACITY {
            return Err(EngineError::OutOfBoundsMemoryAccess {
                address: rounded,
                width: 0,
            });
        }
        self.heap_ptr = rounded as usize;
        self.brk = requested as usize;
        Ok(requested)
    }
}

impl Default for MemoryArena {
    fn default() -> MemoryArena {
        MemoryArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with_stack() -> (MemoryArena, i64) {
        let mut arena = MemoryArena::new();
        let sp = arena.finalize();
        (arena, sp)
    }

    #[test]
    fn store_then_load_round_trips() {
        let (mut arena, sp) = arena_with_stack();
        let addr = sp - 8;
        arena.write_i64(addr, -123, addr).unwrap();
        assert_eq!(arena.read_i64(addr, addr).unwrap(), -123);
    }

    #[test]
    fn crossing_brk_to_sp_gap_fails() {
        let (arena, sp) = arena_with_stack();
        let mid = (arena.brk() as i64 + sp) / 2;
        assert!(arena.read_i64(mid, sp).is_err());
    }

    #[test]
    fn empty_data_section_has_zero_data_ptr() {
        let (arena, _sp) = arena_with_stack();
        assert_eq!(arena.data_ptr(), 0);
    }

    #[test]
    fn brk_grows_heap_ptr_to_page_boundary_but_reports_unrounded_value() {
        let (mut arena, _sp) = arena_with_stack();
        let grown = arena.set_brk(100).unwrap();
        assert_eq!(grown, 100);
        assert_eq!(arena.brk(), 100);
        assert_eq!(arena.heap_ptr(), BRK_PAGE_SIZE);
    }

    #[test]
    fn brk_gap_between_requested_and_rounded_page_is_inaccessible() {
        let (mut arena, sp) = arena_with_stack();
        arena.set_brk(100).unwrap();
        // address 100 sits past brk (100) but still inside the rounded-up
        // heap page (BRK_PAGE_SIZE): must not be readable.
        assert!(arena.read_i64(100, sp).is_err());
    }

    #[test]
    fn brk_reset_to_data_ptr() {
        let (mut arena, _sp) = arena_with_stack();
        arena.set_brk(100).unwrap();
        let reset = arena.set_brk(arena.data_ptr() as i64).unwrap();
        assert_eq!(reset, arena.data_ptr() as i64);
        assert_eq!(arena.heap_ptr(), arena.data_ptr());
    }

    #[test]
    fn brk_beyond_heap_capacity_fails() {
        let (mut arena, _sp) = arena_with_stack();
        assert!(arena.set_brk(HEAP_CAPACITY as i64 + 1).is_err());
    }
}
