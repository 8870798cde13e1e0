//! Hypercall opcodes and interface limits

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hypercall number of the filesystem operation.
pub const HYPERVISOR_HYPFS_OP: u32 = 42;

/// Highest interface version understood by this crate.
pub const HYPFS_VERSION: i64 = 1;

/// Maximum length of a path, including the trailing NUL.
pub const MAX_PATHLEN: usize = 1024;

/// Maximum length of a single entry name, excluding the trailing NUL.
pub const MAX_NAME: usize = 255;

/// Maximum size of a value buffer accepted by a write, including the NUL.
pub const MAX_WRITE_LEN: usize = 4096;

/// Filesystem hypercall opcodes
///
/// Argument layout for every opcode except [`HypfsOp::GetVersion`]:
///
/// | arg | meaning                                   |
/// |-----|-------------------------------------------|
/// | 1   | guest address of the NUL-terminated path  |
/// | 2   | path length including the trailing NUL    |
/// | 3   | guest address of the data buffer          |
/// | 4   | data buffer size                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HypfsOp {
    /// Query the highest supported interface version. Takes no arguments.
    GetVersion,
    /// Copy the NUL-terminated value of a leaf into the data buffer.
    ///
    /// Returns 0 on success or the required buffer size if the buffer is
    /// too small; nothing is copied in that case.
    ReadContents,
    /// Copy the directory records of a directory into the data buffer.
    ///
    /// Same size protocol as [`HypfsOp::ReadContents`].
    ReadDir,
    /// Replace the value of a leaf with the NUL-terminated data buffer.
    #[cfg(feature = "writable")]
    WriteContents,
}

impl HypfsOp {
    /// Returns the opcode number used on the wire
    pub const fn code(self) -> u32 {
        match self {
            HypfsOp::GetVersion => 0,
            HypfsOp::ReadContents => 1,
            HypfsOp::ReadDir => 2,
            #[cfg(feature = "writable")]
            HypfsOp::WriteContents => 3,
        }
    }

    /// Decodes an opcode number; unknown numbers yield `None`
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(HypfsOp::GetVersion),
            1 => Some(HypfsOp::ReadContents),
            2 => Some(HypfsOp::ReadDir),
            #[cfg(feature = "writable")]
            3 => Some(HypfsOp::WriteContents),
            _ => None,
        }
    }

    /// Short name used in logs and audit records
    pub fn name(self) -> &'static str {
        match self {
            HypfsOp::GetVersion => "get_version",
            HypfsOp::ReadContents => "read_contents",
            HypfsOp::ReadDir => "read_dir",
            #[cfg(feature = "writable")]
            HypfsOp::WriteContents => "write_contents",
        }
    }
}

impl fmt::Display for HypfsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
