//! Hypercall argument marshalling

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address in the calling domain's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    /// The null guest address; never mapped
    pub const NULL: GuestAddr = GuestAddr(0);

    /// Returns the address `bytes` further on, or `None` on overflow
    pub fn checked_add(self, bytes: u64) -> Option<GuestAddr> {
        self.0.checked_add(bytes).map(GuestAddr)
    }

    /// Returns true for the null address
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Arguments of one filesystem hypercall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypercallArgs {
    /// Opcode number (see [`crate::HypfsOp`])
    pub cmd: u32,
    /// Guest address of the path
    pub path: GuestAddr,
    /// Path length including the trailing NUL
    pub path_len: u64,
    /// Guest address of the data buffer
    pub buf: GuestAddr,
    /// Data buffer length
    pub buf_len: u64,
}

impl HypercallArgs {
    /// Arguments for an opcode that takes none
    pub fn bare(cmd: u32) -> Self {
        Self {
            cmd,
            path: GuestAddr::NULL,
            path_len: 0,
            buf: GuestAddr::NULL,
            buf_len: 0,
        }
    }

    /// Flattens into the five raw register values
    pub fn to_raw(&self) -> [u64; 5] {
        [
            u64::from(self.cmd),
            self.path.0,
            self.path_len,
            self.buf.0,
            self.buf_len,
        ]
    }

    /// Rebuilds from raw register values; `None` if `cmd` does not fit
    pub fn from_raw(raw: [u64; 5]) -> Option<Self> {
        Some(Self {
            cmd: u32::try_from(raw[0]).ok()?,
            path: GuestAddr(raw[1]),
            path_len: raw[2],
            buf: GuestAddr(raw[3]),
            buf_len: raw[4],
        })
    }
}
