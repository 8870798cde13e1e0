//! Hypercall transport
//!
//! The library never hands its own heap memory to the hypervisor. Paths and
//! replies travel through [`BounceBuffer`]s that the transport allocates in
//! memory it can translate, and every buffer goes back through
//! [`HypercallTransport::free_buffer`].

use hypfs_abi::{Errno, GuestAddr};

/// A buffer the hypervisor can reach
///
/// Not `Clone`: each buffer is freed exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct BounceBuffer {
    addr: GuestAddr,
    len: usize,
}

impl BounceBuffer {
    /// Describes a buffer a transport has just allocated
    pub fn new(addr: GuestAddr, len: usize) -> Self {
        Self { addr, len }
    }

    /// Address as seen by the hypervisor
    pub fn addr(&self) -> GuestAddr {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Channel to the hypervisor
///
/// Implementations may touch the thread's numeric error channel (a free
/// that itself traps into the hypervisor, for example); the library
/// protects callers from that.
pub trait HypercallTransport {
    /// Allocates a zero-filled buffer of `len` bytes
    fn alloc_buffer(&mut self, len: usize) -> Result<BounceBuffer, Errno>;

    /// Returns a buffer to the transport
    fn free_buffer(&mut self, buf: BounceBuffer) -> Result<(), Errno>;

    /// Copies `data` to the start of `buf`
    fn write_buffer(&mut self, buf: &BounceBuffer, data: &[u8]) -> Result<(), Errno>;

    /// Copies the whole of `buf` out
    fn read_buffer(&self, buf: &BounceBuffer) -> Result<Vec<u8>, Errno>;

    /// Issues hypercall `nr` with five raw arguments
    fn hypercall(&mut self, nr: u32, args: [u64; 5]) -> i64;
}
