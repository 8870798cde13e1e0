//! # Hypervisor Filesystem Client
//!
//! User-space library for reading (and, with the `writable` feature,
//! writing) the hypervisor filesystem through its single hypercall.
//!
//! ## Philosophy
//!
//! - **Hide the negotiation**: Callers ask for a value or a listing and get
//!   an owned result. Sizing buffers is the library's problem.
//! - **Bounded retries**: The hypervisor's "need N bytes" answer is trusted
//!   once per round, never forever.
//! - **Errors stay put**: A failed call leaves its [`hypfs_abi::Errno`] on
//!   the per-thread channel in [`errno`], untouched by cleanup.
//! - **Transport agnostic**: [`HypercallTransport`] abstracts the trap and
//!   the bounce buffers, so the same handle drives a real privcmd channel or
//!   the in-process `LoopbackTransport` (feature `loopback`).

pub mod config;
pub mod errno;
pub mod error;
pub mod handle;
#[cfg(feature = "loopback")]
pub mod loopback;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::HypfsError;
pub use handle::{join, DirListing, Dirent, DirentRef, HypfsHandle, WalkEntry};
#[cfg(feature = "loopback")]
pub use loopback::{LoopbackTransport, LOOPBACK_BUFFER_LIMIT};
pub use transport::{BounceBuffer, HypercallTransport};
