//! Fixed sizes and layout constants for the guest memory arena.
//!
//! Mirrors the constants the original Python simulator hardcodes (a 16 KiB
//! heap and a roughly 4 KiB/8-elements-per-KiB stack), given names the way
//! `vcpu`'s `constants.rs` names its bit-layout constants.

/// Width in bytes of a guest general-purpose register and of every load/store.
pub const WORD_BYTES: usize = 8;

/// Size of the heap region, fixed for the lifetime of an `Engine`.
pub const HEAP_CAPACITY: usize = 0x4000;

/// Size of the stack region, fixed for the lifetime of an `Engine`.
pub const STACK_CAPACITY: usize = 4096;

/// Boundary `brk` is rounded up to when growing the heap.
pub const BRK_PAGE_SIZE: usize = 4096;

/// Number of addressable registers: `x0..x28`, `fp`, `lr`, `sp`, `xzr`.
pub const REGISTER_COUNT: usize = 33;
