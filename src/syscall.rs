//! C6: the syscall handler, dispatched on `x8` by `svc 0`.
//!
//! Standard I/O and randomness are threaded through the [`HostIo`]
//! capability rather than bound to `std::io::stdin()`/`stdout()`/an OS RNG
//! at module scope, per spec.md §9 ("Syscall side-effecting I/O"). This is
//! the same injection shape the teacher uses for memory-mapped I/O
//! (`examples/snacchus-vcpu/src/memory/io.rs`'s `IOHandler`), applied here
//! to process-level I/O instead.

use crate::error::EngineError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::io::{self, BufRead, Write};

/// The externally-visible effects the guest can trigger: reading a line,
/// writing bytes, and drawing random bytes. Swappable so engine runs are
/// deterministic under test.
pub trait HostIo {
    fn read_line(&mut self) -> io::Result<String>;
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn fill_random(&mut self, buf: &mut [u8]);
}

/// Production [`HostIo`]: real stdin/stdout, `OsRng` for `getrandom`.
pub struct StdHostIo;

impl HostIo for StdHostIo {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(bytes)?;
        handle.flush()
    }

    fn fill_random(&mut self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Syscall numbers from spec.md §4.6.
pub const SYS_READ: i64 = 63;
pub const SYS_WRITE: i64 = 64;
pub const SYS_EXIT: i64 = 93;
pub const SYS_BRK: i64 = 214;
pub const SYS_GETRANDOM: i64 = 278;

/// A deterministic [`HostIo`] usable both by this crate's own unit tests
/// and by integration tests in `tests/`, which link against the ordinary
/// (non-`cfg(test)`) build of this library.
pub mod test_support {
    use super::HostIo;
    use std::collections::VecDeque;
    use std::io;

    /// A deterministic [`HostIo`] for tests: feeds scripted input lines,
    /// captures written bytes, and fills "randomness" from a fixed pattern.
    #[derive(Default)]
    pub struct ScriptedHostIo {
        pub input_lines: VecDeque<String>,
        pub output: Vec<u8>,
    }

    impl HostIo for ScriptedHostIo {
        fn read_line(&mut self) -> io::Result<String> {
            Ok(self.input_lines.pop_front().unwrap_or_default())
        }

        fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.output.extend_from_slice(bytes);
            Ok(())
        }

        fn fill_random(&mut self, buf: &mut [u8]) {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = i as u8;
            }
        }
    }
}

pub fn unsupported(number: i64) -> EngineError {
    EngineError::UnsupportedSyscall(number)
}
