//! Client error type

use hypfs_abi::{Errno, WireError};
use thiserror::Error;

/// Errors returned by [`crate::HypfsHandle`] operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HypfsError {
    /// Path plus terminator exceeds the interface limit
    #[error("Path of {len} bytes exceeds the limit")]
    NameTooLong { len: usize },

    /// Argument cannot be marshalled (embedded NUL)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport could not provide a bounce buffer
    #[error("Cannot allocate a bounce buffer of {size} bytes")]
    OutOfMemory { size: usize },

    /// The transport failed to move data in or out of a bounce buffer
    #[error("Transport error: {0}")]
    Transport(Errno),

    /// The hypervisor rejected the call
    #[error("Hypervisor error: {0}")]
    Hypervisor(Errno),

    /// The hypervisor kept asking for larger buffers
    #[error("Size negotiation did not settle after {rounds} rounds")]
    NegotiationExhausted { rounds: u32 },

    /// The hypervisor asked for a size that would not help
    #[error("Hypervisor asked for {reported} bytes after being offered {offered}")]
    ProtocolViolation { offered: usize, reported: u64 },

    /// Reply bytes do not form what the operation returns
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Directory records could not be decoded
    #[error(transparent)]
    Wire(#[from] WireError),

    /// No filesystem is reachable through the channel
    #[error("Hypercall channel is not connected")]
    NotConnected,
}

impl HypfsError {
    /// Value published on the numeric error channel
    pub fn errno(&self) -> Errno {
        match self {
            HypfsError::NameTooLong { .. } => Errno::NameTooLong,
            HypfsError::InvalidArgument(_) => Errno::InvalidArgument,
            HypfsError::OutOfMemory { .. } | HypfsError::NegotiationExhausted { .. } => {
                Errno::OutOfMemory
            }
            HypfsError::Transport(errno) | HypfsError::Hypervisor(errno) => *errno,
            HypfsError::ProtocolViolation { .. } | HypfsError::MalformedReply(_) => Errno::Io,
            HypfsError::Wire(err) => err.errno(),
            HypfsError::NotConnected => Errno::BadHandle,
        }
    }
}
