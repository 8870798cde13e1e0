//! In-process transport
//!
//! Connects a handle straight to a [`Hypfs`] instance in the same process.
//! Bounce buffers are mappings in a simulated address space owned by the
//! calling domain, so the full copy-in/copy-out path is exercised.
//!
//! ```
//! use hypfs_client::{HypfsHandle, LoopbackTransport};
//! use hypfs_core::{Caller, Hypfs, Tree};
//! use std::sync::Arc;
//!
//! let mut tree = Tree::new();
//! tree.new_string_leaf(tree.root(), "buildid", "abc123").unwrap();
//! let fs = Arc::new(Hypfs::new(tree));
//!
//! let transport = LoopbackTransport::new(fs, Caller::control());
//! let mut handle = HypfsHandle::open(transport, None, 0);
//! assert_eq!(handle.read("/buildid").unwrap(), "abc123");
//! handle.close();
//! ```

use crate::transport::{BounceBuffer, HypercallTransport};
use crate::HypfsError;
use hypfs_abi::{Errno, HypercallArgs, HYPERVISOR_HYPFS_OP};
use hypfs_core::{global, Caller, Hypfs, SimulatedGuestMemory};
use std::sync::Arc;

/// Largest bounce buffer the loopback transport hands out
pub const LOOPBACK_BUFFER_LIMIT: usize = 16 * 1024 * 1024;

/// Transport that calls straight into an in-process filesystem
pub struct LoopbackTransport {
    fs: Arc<Hypfs>,
    caller: Caller,
    memory: SimulatedGuestMemory,
}

impl LoopbackTransport {
    /// Connects `caller` to `fs`
    pub fn new(fs: Arc<Hypfs>, caller: Caller) -> Self {
        Self {
            fs,
            caller,
            memory: SimulatedGuestMemory::new(),
        }
    }

    /// Connects `caller` to the process-wide filesystem
    pub fn connect_global(caller: Caller) -> Result<Self, HypfsError> {
        let fs = global::get().ok_or(HypfsError::NotConnected)?;
        Ok(Self::new(fs, caller))
    }

    /// The filesystem behind the channel
    pub fn filesystem(&self) -> &Arc<Hypfs> {
        &self.fs
    }

    pub fn caller(&self) -> Caller {
        self.caller
    }

    /// Bounce buffers allocated and not yet freed
    pub fn outstanding_buffers(&self) -> usize {
        self.memory.region_count()
    }
}

impl HypercallTransport for LoopbackTransport {
    fn alloc_buffer(&mut self, len: usize) -> Result<BounceBuffer, Errno> {
        if len > LOOPBACK_BUFFER_LIMIT {
            return Err(Errno::OutOfMemory);
        }
        let addr = self.memory.map_region(len);
        Ok(BounceBuffer::new(addr, len))
    }

    fn free_buffer(&mut self, buf: BounceBuffer) -> Result<(), Errno> {
        if self.memory.unmap_region(buf.addr()) {
            Ok(())
        } else {
            Err(Errno::InvalidArgument)
        }
    }

    fn write_buffer(&mut self, buf: &BounceBuffer, data: &[u8]) -> Result<(), Errno> {
        if data.len() > buf.len() {
            return Err(Errno::InvalidArgument);
        }
        self.memory.write(buf.addr(), data).map_err(|e| e.errno())
    }

    fn read_buffer(&self, buf: &BounceBuffer) -> Result<Vec<u8>, Errno> {
        self.memory.read(buf.addr(), buf.len()).map_err(|e| e.errno())
    }

    fn hypercall(&mut self, nr: u32, args: [u64; 5]) -> i64 {
        let unsupported = -i64::from(Errno::NotImplemented.code());
        if nr != HYPERVISOR_HYPFS_OP {
            return unsupported;
        }
        match HypercallArgs::from_raw(args) {
            Some(args) => self.fs.do_hypfs_op(self.caller, &mut self.memory, args),
            None => unsupported,
        }
    }
}
