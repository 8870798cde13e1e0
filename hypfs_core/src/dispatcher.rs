//! Hypercall dispatcher
//!
//! [`Hypfs::do_hypfs_op`] is the only entry point from a guest into the
//! filesystem. Each call runs to completion under one spinlock, so every
//! hypercall is atomic with respect to every other one; the lock is released
//! on all exit paths when the guard drops.
//!
//! Per call, in order:
//!
//! 1. Reject unprivileged callers (`PermissionDenied`)
//! 2. Answer `GetVersion` without touching the tree
//! 3. Import the path from guest memory (`InvalidArgument`, `BadAddress`)
//! 4. Resolve it (`NotFound`)
//! 5. Dispatch on the opcode (`NotImplemented` for unknown ones)

use crate::domain::Caller;
use crate::guest_memory::GuestMemory;
use crate::tree::{EntryId, Payload, Tree};
use hypfs_abi::{Errno, GuestAddr, HypercallArgs, HypercallReturn, HypfsOp, HYPFS_VERSION, MAX_PATHLEN};
#[cfg(feature = "writable")]
use hypfs_abi::MAX_WRITE_LEN;
use serde::{Deserialize, Serialize};
use spin::Mutex;
use std::collections::VecDeque;

/// Hypercall audit event (for testing and verification)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HypercallEvent {
    /// Hypercall entered the dispatcher
    Invoked { caller: Caller, op: String },
    /// Hypercall returned a non-negative value
    Completed { caller: Caller, op: String, ret: u64 },
    /// Hypercall failed
    Rejected {
        caller: Caller,
        op: String,
        errno: Errno,
    },
}

/// Bounded audit log for hypercalls
///
/// Holds the most recent `capacity` events; older ones are discarded and
/// counted in [`HypercallAuditLog::dropped`]. A capacity of 0 disables
/// recording.
#[derive(Debug, Clone)]
pub struct HypercallAuditLog {
    events: VecDeque<HypercallEvent>,
    capacity: usize,
    dropped: u64,
}

impl HypercallAuditLog {
    /// Events kept by [`HypercallAuditLog::new`]
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// A log keeping at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// A log that records nothing
    pub fn disabled() -> Self {
        Self::with_capacity(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, event: HypercallEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &HypercallEvent> + '_ {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events discarded to stay within capacity
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&HypercallEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&HypercallEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl Default for HypercallAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// The hypervisor filesystem: a tree behind the global lock
#[derive(Debug)]
pub struct Hypfs {
    tree: Mutex<Tree>,
    audit_log: Mutex<HypercallAuditLog>,
}

impl Hypfs {
    /// Wraps a populated tree, auditing the most recent hypercalls
    pub fn new(tree: Tree) -> Self {
        Self::with_audit_log(tree, HypercallAuditLog::new())
    }

    /// Wraps a populated tree with a given audit log
    ///
    /// Pass [`HypercallAuditLog::disabled`] to record nothing.
    pub fn with_audit_log(tree: Tree, audit_log: HypercallAuditLog) -> Self {
        Self {
            tree: Mutex::new(tree),
            audit_log: Mutex::new(audit_log),
        }
    }

    /// Runs `f` with shared access to the tree, under the lock
    pub fn with_tree<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        f(&*self.tree.lock())
    }

    /// Runs `f` with exclusive access to the tree, under the lock
    ///
    /// Registrars publishing entries after boot go through here.
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> R {
        f(&mut *self.tree.lock())
    }

    /// Takes the tree back for teardown
    pub fn into_tree(self) -> Tree {
        self.tree.into_inner()
    }

    /// Returns a copy of the audit log
    pub fn audit_log(&self) -> HypercallAuditLog {
        self.audit_log.lock().clone()
    }

    /// Clears the audit log
    pub fn clear_audit_log(&self) {
        self.audit_log.lock().clear();
    }

    /// Executes one filesystem hypercall on behalf of `caller`
    ///
    /// `mem` is the caller's address space. Returns 0 on success, a positive
    /// value for a required buffer size or the interface version, or a
    /// negated [`Errno`].
    pub fn do_hypfs_op(
        &self,
        caller: Caller,
        mem: &mut dyn GuestMemory,
        args: HypercallArgs,
    ) -> i64 {
        let auditing = self.audit_log.lock().is_enabled();
        let op = if auditing {
            let op = op_name(args.cmd);
            self.audit_log.lock().record(HypercallEvent::Invoked {
                caller,
                op: op.clone(),
            });
            Some(op)
        } else {
            None
        };

        let result = self.execute(caller, mem, &args);

        if let Some(op) = op {
            let event = match result {
                Ok(ret) => HypercallEvent::Completed { caller, op, ret },
                Err(errno) => HypercallEvent::Rejected { caller, op, errno },
            };
            self.audit_log.lock().record(event);
        }

        let ret = match result {
            Ok(0) => HypercallReturn::Done,
            Ok(value) => HypercallReturn::Value(value),
            Err(errno) => HypercallReturn::Error(errno),
        };
        ret.encode()
    }

    fn execute(
        &self,
        caller: Caller,
        mem: &mut dyn GuestMemory,
        args: &HypercallArgs,
    ) -> Result<u64, Errno> {
        if !caller.is_privileged() {
            return Err(Errno::PermissionDenied);
        }

        let op = HypfsOp::from_code(args.cmd);
        if op == Some(HypfsOp::GetVersion) {
            return Ok(HYPFS_VERSION as u64);
        }

        #[cfg(feature = "writable")]
        let mut tree = self.tree.lock();
        #[cfg(not(feature = "writable"))]
        let tree = self.tree.lock();

        let mut path_buf = [0u8; MAX_PATHLEN];
        let path = import_path(mem, args.path, args.path_len, &mut path_buf)?;
        let entry = tree.get_entry(path).ok_or(Errno::NotFound)?;

        match op {
            Some(HypfsOp::ReadContents) => read_contents(&tree, entry, mem, args),
            Some(HypfsOp::ReadDir) => read_dir(&tree, entry, mem, args),
            #[cfg(feature = "writable")]
            Some(HypfsOp::WriteContents) => write_contents(&mut tree, entry, mem, args),
            Some(HypfsOp::GetVersion) | None => Err(Errno::NotImplemented),
        }
    }
}

fn op_name(cmd: u32) -> String {
    match HypfsOp::from_code(cmd) {
        Some(op) => op.name().to_string(),
        None => format!("unknown({})", cmd),
    }
}

/// Copies the path into `buf` and returns it up to the first NUL
///
/// The last imported byte is forced to NUL. A path that is not UTF-8 cannot
/// name any entry and resolves to nothing.
fn import_path<'a>(
    mem: &dyn GuestMemory,
    addr: GuestAddr,
    len: u64,
    buf: &'a mut [u8; MAX_PATHLEN],
) -> Result<&'a str, Errno> {
    let len = usize::try_from(len).map_err(|_| Errno::InvalidArgument)?;
    if len == 0 || len > MAX_PATHLEN {
        return Err(Errno::InvalidArgument);
    }

    mem.copy_from_guest(addr, &mut buf[..len])
        .map_err(|e| e.errno())?;
    buf[len - 1] = 0;

    let end = buf.iter().position(|b| *b == 0).unwrap_or(len - 1);
    std::str::from_utf8(&buf[..end]).map_err(|_| Errno::NotFound)
}

fn read_contents(
    tree: &Tree,
    entry: EntryId,
    mem: &mut dyn GuestMemory,
    args: &HypercallArgs,
) -> Result<u64, Errno> {
    let entry = tree.entry(entry).ok_or(Errno::NotFound)?;
    let leaf = match entry.payload() {
        Payload::StringLeaf(leaf) => leaf,
        Payload::Directory(_) => return Err(Errno::IsDirectory),
    };

    let need = u64::from(leaf.content_len());
    if need > args.buf_len {
        return Ok(need);
    }

    let mut bytes = Vec::with_capacity(leaf.value().len() + 1);
    bytes.extend_from_slice(leaf.value().as_bytes());
    bytes.push(0);
    mem.copy_to_guest(args.buf, &bytes).map_err(|e| e.errno())?;
    Ok(0)
}

fn read_dir(
    tree: &Tree,
    entry: EntryId,
    mem: &mut dyn GuestMemory,
    args: &HypercallArgs,
) -> Result<u64, Errno> {
    let need = u64::from(tree.content_size(entry).ok_or(Errno::NotADirectory)?);
    if need > args.buf_len {
        return Ok(need);
    }

    let records = tree.dir_records(entry).map_err(|e| e.errno())?;
    let mut offset = 0u64;
    for (header, name) in records {
        let record = header.encode_record(name);
        let at = args.buf.checked_add(offset).ok_or(Errno::BadAddress)?;
        mem.copy_to_guest(at, &record).map_err(|e| e.errno())?;
        offset += record.len() as u64;
    }
    Ok(0)
}

#[cfg(feature = "writable")]
fn write_contents(
    tree: &mut Tree,
    entry: EntryId,
    mem: &mut dyn GuestMemory,
    args: &HypercallArgs,
) -> Result<u64, Errno> {
    match tree.entry(entry).map(|e| e.payload()) {
        Some(Payload::StringLeaf(leaf)) if !leaf.is_writable() => return Err(Errno::AccessDenied),
        Some(Payload::StringLeaf(_)) => {}
        Some(Payload::Directory(_)) => return Err(Errno::IsDirectory),
        None => return Err(Errno::NotFound),
    }

    let len = usize::try_from(args.buf_len).map_err(|_| Errno::InvalidArgument)?;
    if len == 0 || len > MAX_WRITE_LEN {
        return Err(Errno::InvalidArgument);
    }

    let mut data = vec![0u8; len];
    mem.copy_from_guest(args.buf, &mut data)
        .map_err(|e| e.errno())?;
    data[len - 1] = 0;
    let end = data.iter().position(|b| *b == 0).unwrap_or(len - 1);
    data.truncate(end);

    let value = String::from_utf8(data).map_err(|_| Errno::InvalidArgument)?;
    tree.write_leaf(entry, value).map_err(|e| e.errno())?;
    Ok(0)
}
