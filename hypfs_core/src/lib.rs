//! # Hypervisor Filesystem
//!
//! The hypervisor-resident side of a small sysfs-like filesystem: a tree of
//! named directories and string leaves that privileged domains read (and
//! optionally write) through a single hypercall.
//!
//! ## Philosophy
//!
//! - **Arena, not pointers**: Entries live in one vector and refer to each
//!   other by index. Parent links are lookups, never ownership.
//! - **One lock, bounded work**: Every hypercall runs to completion under a
//!   single spinlock. Reads are linear in the value or child count.
//! - **Sizes, not truncation**: A buffer that is too small gets the exact
//!   size it needs back; nothing is copied.
//! - **Guest memory is foreign**: All access goes through [`GuestMemory`]
//!   and fails whole.
//!
//! ## Key Types
//!
//! - [`Tree`]: Entry arena with sorted directories and cached wire sizes
//! - [`Hypfs`]: The tree behind the global lock, with the hypercall entry point
//! - [`Caller`]: Domain on whose behalf a hypercall runs
//! - [`GuestMemory`] / [`SimulatedGuestMemory`]: Caller address spaces
//! - [`TreeManifest`]: JSON description of the boot-time tree

pub mod dispatcher;
pub mod domain;
pub mod global;
pub mod guest_memory;
pub mod manifest;
pub mod path;
pub mod tree;

pub use dispatcher::{HypercallAuditLog, HypercallEvent, Hypfs};
pub use domain::{Caller, DomainRole};
pub use global::GlobalError;
pub use guest_memory::{GuestAccessError, GuestMemory, SimulatedGuestMemory, GUEST_PAGE_SIZE};
pub use manifest::{ManifestEntry, ManifestError, TreeManifest};
pub use tree::{DirBody, Entry, EntryId, EntryKind, Leaf, Payload, Tree, TreeError};
