//! # Hypervisor Filesystem ABI
//!
//! This crate defines everything that crosses the hypercall boundary between
//! the hypervisor-resident filesystem and its user-space client library.
//!
//! ## Philosophy
//!
//! - **One definition of the wire**: Server and client encode and decode
//!   through the same types, so the layouts cannot drift apart.
//! - **Numbers at the edge, types inside**: Hypercalls return a bare `i64`;
//!   everything else works with [`Errno`] and [`HypercallReturn`].
//! - **No allocation on the hot path**: Records are walked in place.
//!
//! ## Key Types
//!
//! - [`HypfsOp`]: Hypercall opcodes
//! - [`Errno`]: Conventional numeric error codes
//! - [`HypercallReturn`]: The signed return convention
//! - [`DirEntryHeader`] / [`DirRecords`]: Directory record wire format
//! - [`HypercallArgs`] / [`GuestAddr`]: Raw argument marshalling
//! - [`DomainId`] / [`HandleId`]: Identifiers for callers and client handles

pub mod args;
pub mod direntry;
pub mod errno;
pub mod ids;
pub mod ops;

pub use args::{GuestAddr, HypercallArgs};
pub use direntry::{
    direntry_size, round_up, DirEntryHeader, DirRecord, DirRecords, WireError,
    DIRENTRY_HEADER_SIZE, DIRENTRY_NAME_ALIGN, HYPFS_ISDIR,
};
pub use errno::{Errno, HypercallReturn};
pub use ids::{DomainId, HandleId};
pub use ops::{HypfsOp, HYPERVISOR_HYPFS_OP, HYPFS_VERSION, MAX_NAME, MAX_PATHLEN, MAX_WRITE_LEN};
