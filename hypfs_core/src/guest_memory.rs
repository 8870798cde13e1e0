//! Guest address spaces
//!
//! The dispatcher never touches caller memory directly. Every path import and
//! every reply goes through [`GuestMemory`], which either copies the whole
//! range or fails without side effects.

use hypfs_abi::{Errno, GuestAddr};
use std::collections::BTreeMap;
use thiserror::Error;

/// Granularity of simulated mappings
pub const GUEST_PAGE_SIZE: u64 = 0x1000;

/// Errors copying between the hypervisor and a guest
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuestAccessError {
    #[error("Guest address {addr} is not mapped")]
    Unmapped { addr: GuestAddr },

    #[error("Guest range {addr}+{len} crosses the end of its mapping")]
    OutOfBounds { addr: GuestAddr, len: usize },

    #[error("Guest address {addr} is read-only")]
    ReadOnly { addr: GuestAddr },
}

impl GuestAccessError {
    /// All copy failures surface as a bad address
    pub fn errno(&self) -> Errno {
        Errno::BadAddress
    }
}

/// Copy primitives into and out of a calling domain
///
/// A zero-length copy always succeeds, whatever the address.
pub trait GuestMemory {
    /// Copies `dst.len()` bytes starting at `addr` into `dst`
    fn copy_from_guest(&self, addr: GuestAddr, dst: &mut [u8]) -> Result<(), GuestAccessError>;

    /// Copies `src` into guest memory starting at `addr`
    fn copy_to_guest(&mut self, addr: GuestAddr, src: &[u8]) -> Result<(), GuestAccessError>;
}

#[derive(Debug, Clone)]
struct Region {
    bytes: Vec<u8>,
    writable: bool,
}

/// Guest address space backed by host vectors
///
/// Regions are placed at page-aligned addresses with an unmapped guard page
/// between neighbours, so an overrun faults instead of spilling into the next
/// mapping. Address 0 is never mapped.
#[derive(Debug, Clone)]
pub struct SimulatedGuestMemory {
    regions: BTreeMap<u64, Region>,
    next_base: u64,
}

impl SimulatedGuestMemory {
    /// Creates an empty address space
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_base: GUEST_PAGE_SIZE,
        }
    }

    /// Maps a zero-filled writable region of `len` bytes
    pub fn map_region(&mut self, len: usize) -> GuestAddr {
        self.insert(vec![0; len], true)
    }

    /// Maps a read-only region holding a copy of `bytes`
    pub fn map_readonly(&mut self, bytes: &[u8]) -> GuestAddr {
        self.insert(bytes.to_vec(), false)
    }

    /// Removes the region starting at `addr`; returns false if none does
    pub fn unmap_region(&mut self, addr: GuestAddr) -> bool {
        self.regions.remove(&addr.0).is_some()
    }

    /// Number of live mappings
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Reads `len` bytes from the guest into a new vector
    pub fn read(&self, addr: GuestAddr, len: usize) -> Result<Vec<u8>, GuestAccessError> {
        let mut out = vec![0; len];
        self.copy_from_guest(addr, &mut out)?;
        Ok(out)
    }

    /// Writes `bytes` into the guest
    pub fn write(&mut self, addr: GuestAddr, bytes: &[u8]) -> Result<(), GuestAccessError> {
        self.copy_to_guest(addr, bytes)
    }

    fn insert(&mut self, bytes: Vec<u8>, writable: bool) -> GuestAddr {
        let base = self.next_base;
        let span = (bytes.len() as u64).max(1);
        let pages = span.div_ceil(GUEST_PAGE_SIZE);
        // One extra page stays unmapped as a guard
        self.next_base = base + (pages + 1) * GUEST_PAGE_SIZE;
        self.regions.insert(base, Region { bytes, writable });
        GuestAddr(base)
    }

    fn locate(&self, addr: GuestAddr, len: usize) -> Result<(u64, usize), GuestAccessError> {
        let (base, region) = self
            .regions
            .range(..=addr.0)
            .next_back()
            .ok_or(GuestAccessError::Unmapped { addr })?;
        let start = usize::try_from(addr.0 - base).map_err(|_| GuestAccessError::Unmapped { addr })?;
        if start >= region.bytes.len() {
            return Err(GuestAccessError::Unmapped { addr });
        }
        match start.checked_add(len) {
            Some(end) if end <= region.bytes.len() => Ok((*base, start)),
            _ => Err(GuestAccessError::OutOfBounds { addr, len }),
        }
    }
}

impl Default for SimulatedGuestMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestMemory for SimulatedGuestMemory {
    fn copy_from_guest(&self, addr: GuestAddr, dst: &mut [u8]) -> Result<(), GuestAccessError> {
        if dst.is_empty() {
            return Ok(());
        }
        let (base, start) = self.locate(addr, dst.len())?;
        let region = self
            .regions
            .get(&base)
            .ok_or(GuestAccessError::Unmapped { addr })?;
        dst.copy_from_slice(&region.bytes[start..start + dst.len()]);
        Ok(())
    }

    fn copy_to_guest(&mut self, addr: GuestAddr, src: &[u8]) -> Result<(), GuestAccessError> {
        if src.is_empty() {
            return Ok(());
        }
        let (base, start) = self.locate(addr, src.len())?;
        let region = self
            .regions
            .get_mut(&base)
            .ok_or(GuestAccessError::Unmapped { addr })?;
        if !region.writable {
            return Err(GuestAccessError::ReadOnly { addr });
        }
        region.bytes[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }
}
