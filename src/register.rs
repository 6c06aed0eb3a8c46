//! The register file and condition flags (C4).
//!
//! `RegisterId` follows the teacher's `enums.rs` pattern of a fieldless enum
//! with `FromPrimitive`/`ToPrimitive`/`InteropGetName`/`EnumFromStr` derived
//! via `num-derive`/`util-derive`, indexed straight into a fixed-size array
//! the way `examples/snacchus-vcpu/src/enums.rs`'s `RegisterId` indexes its
//! register bank through `register_index`.

use crate::constants::REGISTER_COUNT;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive as _;
use util_derive::{EnumFromStr, InteropGetName};

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive, InteropGetName, EnumFromStr)]
pub enum RegisterId {
    X0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
    X16,
    X17,
    X18,
    X19,
    X20,
    X21,
    X22,
    X23,
    X24,
    X25,
    X26,
    X27,
    X28,
    Fp,
    Lr,
    Sp,
    Xzr,
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

#[inline]
pub fn register_index(id: RegisterId) -> usize {
    id.to_usize().unwrap()
}

/// The `Z`/`N` condition flags. `C`/`V` are not modeled (spec Non-goals).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub zero: bool,
    pub negative: bool,
}

impl Flags {
    /// Sets both flags from a signed 64-bit result, the way every
    /// flag-updating instruction (`adds`, `subs`, `ands`, ...) does.
    pub fn set_from(&mut self, result: i64) {
        self.zero = result == 0;
        self.negative = result < 0;
    }
}

/// Fixed bank of 33 64-bit signed registers, indexed by [`RegisterId`].
///
/// `xzr` reads as zero always; writes to it are accepted (so the decoder
/// never needs a special case) and silenced at end-of-step by
/// [`RegisterFile::clear_xzr`], matching the main loop's `reg["xzr"] := 0`.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    values: [i64; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> RegisterFile {
        RegisterFile {
            values: [0; REGISTER_COUNT],
        }
    }

    /// # Examples
    ///
    /// ```
    /// use armsim::register::{RegisterFile, RegisterId};
    ///
    /// let mut regs = RegisterFile::new();
    /// regs.write(RegisterId::X0, 42);
    /// assert_eq!(regs.read(RegisterId::X0), 42);
    /// ```
    pub fn read(&self, id: RegisterId) -> i64 {
        if id == RegisterId::Xzr {
            return 0;
        }
        self.values[register_index(id)]
    }

    pub fn write(&mut self, id: RegisterId, value: i64) {
        self.values[register_index(id)] = value;
    }

    /// Re-establishes the `xzr == 0` invariant after an instruction step.
    pub fn clear_xzr(&mut self) {
        self.values[register_index(RegisterId::Xzr)] = 0;
    }
}

impl Default for RegisterFile {
    fn default() -> RegisterFile {
        RegisterFile::new()
    }
}
