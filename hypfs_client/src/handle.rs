//! Library handle
//!
//! A [`HypfsHandle`] wraps one hypercall channel, a logger and the caller's
//! open flags. Operations take `&mut self`: a handle serves one thread at a
//! time, distinct handles are independent.
//!
//! ## Size negotiation
//!
//! Reads offer a buffer of [`ClientConfig::initial_buffer_size`] bytes. When
//! the hypervisor answers with a positive number instead of 0, that number
//! is the exact size the reply needs; the buffer is replaced and the call
//! repeated. This relies on the reported size being final. A reply that
//! would not grow the buffer is a protocol violation, and the loop gives up
//! after [`ClientConfig::max_negotiation_rounds`] calls.

use crate::errno::{set_last_error, ErrnoGuard};
use crate::transport::{BounceBuffer, HypercallTransport};
use crate::{ClientConfig, ConfigError, HypfsError};
use hypfs_abi::{
    DirRecords, HandleId, HypercallArgs, HypercallReturn, HypfsOp, HYPERVISOR_HYPFS_OP,
    MAX_PATHLEN,
};
use hypfs_log::{FacadeLogger, LogEntry, LogLevel, Logger};
use std::sync::Arc;

/// One directory entry of a [`DirListing`]
///
/// The name lives in the listing's shared name region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dirent {
    name_offset: usize,
    name_len: usize,
    is_dir: bool,
}

impl Dirent {
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// Borrowed view of one directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirentRef<'a> {
    pub name: &'a str,
    pub is_dir: bool,
}

/// Owned result of a directory read
///
/// Holds the entries in hypervisor order plus one region with every name,
/// each NUL-terminated, back to back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirListing {
    entries: Vec<Dirent>,
    names: String,
}

impl DirListing {
    /// Decodes a filled reply buffer
    ///
    /// A first pass counts the records and their name bytes so the result
    /// is allocated once.
    pub fn from_wire(buf: &[u8]) -> Result<Self, HypfsError> {
        let mut count = 0;
        let mut name_bytes = 0;
        for record in DirRecords::new(buf) {
            let record = record?;
            count += 1;
            name_bytes += record.name.len() + 1;
        }

        let mut listing = DirListing {
            entries: Vec::with_capacity(count),
            names: String::with_capacity(name_bytes),
        };
        for record in DirRecords::new(buf) {
            let record = record?;
            listing.entries.push(Dirent {
                name_offset: listing.names.len(),
                name_len: record.name.len(),
                is_dir: record.is_dir(),
            });
            listing.names.push_str(record.name);
            listing.names.push('\0');
        }
        Ok(listing)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry descriptors in hypervisor order
    pub fn entries(&self) -> &[Dirent] {
        &self.entries
    }

    /// The name region: every name followed by a NUL
    pub fn name_region(&self) -> &str {
        &self.names
    }

    /// Name of a descriptor from this listing
    pub fn name(&self, dirent: &Dirent) -> &str {
        self.names
            .get(dirent.name_offset..dirent.name_offset + dirent.name_len)
            .unwrap_or("")
    }

    pub fn get(&self, index: usize) -> Option<DirentRef<'_>> {
        self.entries.get(index).map(|d| self.view(d))
    }

    pub fn iter(&self) -> impl Iterator<Item = DirentRef<'_>> + '_ {
        self.entries.iter().map(move |d| self.view(d))
    }

    fn view(&self, dirent: &Dirent) -> DirentRef<'_> {
        DirentRef {
            name: self.name(dirent),
            is_dir: dirent.is_dir,
        }
    }
}

/// One line of a recursive listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// 0 for children of the starting directory
    pub depth: usize,
    /// Absolute path
    pub path: String,
    pub is_dir: bool,
}

/// Open connection to the hypervisor filesystem
pub struct HypfsHandle<T: HypercallTransport> {
    id: HandleId,
    transport: T,
    logger: Arc<dyn Logger>,
    owns_logger: bool,
    flags: u32,
    config: ClientConfig,
}

impl<T: HypercallTransport> HypfsHandle<T> {
    /// Opens a handle over `channel`
    ///
    /// Without a logger the handle creates a [`FacadeLogger`] of its own and
    /// drops it on close.
    pub fn open(channel: T, logger: Option<Arc<dyn Logger>>, flags: u32) -> Self {
        Self::build(channel, logger, flags, ClientConfig::default())
    }

    /// Opens a handle with explicit negotiation settings
    pub fn open_with_config(
        channel: T,
        logger: Option<Arc<dyn Logger>>,
        flags: u32,
        config: ClientConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(channel, logger, flags, config))
    }

    fn build(
        channel: T,
        logger: Option<Arc<dyn Logger>>,
        flags: u32,
        config: ClientConfig,
    ) -> Self {
        let (logger, owns_logger) = match logger {
            Some(logger) => (logger, false),
            None => (Arc::new(FacadeLogger::default()) as Arc<dyn Logger>, true),
        };
        let handle = Self {
            id: HandleId::new(),
            transport: channel,
            logger,
            owns_logger,
            flags,
            config,
        };
        handle.log(
            LogEntry::new(LogLevel::Debug, "handle opened").with_field("flags", handle.flags),
        );
        handle
    }

    /// Closes the handle, releasing the channel and any logger it created
    pub fn close(self) {
        drop(self);
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True if the logger was created by [`HypfsHandle::open`]
    pub fn owns_logger(&self) -> bool {
        self.owns_logger
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads the value of the leaf at `path`
    pub fn read(&mut self, path: &str) -> Result<String, HypfsError> {
        let result = self.read_any(HypfsOp::ReadContents, path).and_then(|bytes| {
            let end = bytes
                .iter()
                .position(|b| *b == 0)
                .ok_or_else(|| HypfsError::MalformedReply("value is not terminated".to_string()))?;
            String::from_utf8(bytes[..end].to_vec())
                .map_err(|_| HypfsError::MalformedReply("value is not UTF-8".to_string()))
        });
        self.finish(HypfsOp::ReadContents, path, result)
    }

    /// Lists the directory at `path`
    pub fn read_dir(&mut self, path: &str) -> Result<DirListing, HypfsError> {
        let result = self
            .read_any(HypfsOp::ReadDir, path)
            .and_then(|bytes| DirListing::from_wire(&bytes));
        self.finish(HypfsOp::ReadDir, path, result)
    }

    /// Replaces the value of the leaf at `path`
    #[cfg(feature = "writable")]
    pub fn write(&mut self, path: &str, value: &str) -> Result<(), HypfsError> {
        let result = self.write_inner(path, value);
        self.finish(HypfsOp::WriteContents, path, result)
    }

    /// Interface version implemented by the hypervisor
    pub fn version(&mut self) -> Result<u64, HypfsError> {
        let args = HypercallArgs::bare(HypfsOp::GetVersion.code());
        let raw = self.transport.hypercall(HYPERVISOR_HYPFS_OP, args.to_raw());
        let result = match HypercallReturn::decode(raw) {
            HypercallReturn::Value(version) => Ok(version),
            HypercallReturn::Done => Err(HypfsError::MalformedReply(
                "no version reported".to_string(),
            )),
            HypercallReturn::Error(errno) => Err(HypfsError::Hypervisor(errno)),
        };
        self.finish(HypfsOp::GetVersion, "", result)
    }

    /// Lists everything below `path`, depth first, parents before children
    pub fn walk(&mut self, path: &str) -> Result<Vec<WalkEntry>, HypfsError> {
        let mut out = Vec::new();
        self.walk_into(path, 0, &mut out)?;
        Ok(out)
    }

    fn walk_into(
        &mut self,
        dir: &str,
        depth: usize,
        out: &mut Vec<WalkEntry>,
    ) -> Result<(), HypfsError> {
        let listing = self.read_dir(dir)?;
        for entry in listing.iter() {
            let path = join(dir, entry.name);
            out.push(WalkEntry {
                depth,
                path: path.clone(),
                is_dir: entry.is_dir,
            });
            if entry.is_dir {
                self.walk_into(&path, depth + 1, out)?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "writable")]
    fn write_inner(&mut self, path: &str, value: &str) -> Result<(), HypfsError> {
        if value.contains('\0') {
            return Err(HypfsError::InvalidArgument(
                "value contains a NUL byte".to_string(),
            ));
        }
        let path_buf = self.path_buffer(path)?;
        let result = self.stage(value).and_then(|data| {
            let args = HypercallArgs {
                cmd: HypfsOp::WriteContents.code(),
                path: path_buf.addr(),
                path_len: path_buf.len() as u64,
                buf: data.addr(),
                buf_len: data.len() as u64,
            };
            let raw = self.transport.hypercall(HYPERVISOR_HYPFS_OP, args.to_raw());
            self.release(data);
            match HypercallReturn::decode(raw) {
                HypercallReturn::Done => Ok(()),
                HypercallReturn::Error(errno) => Err(HypfsError::Hypervisor(errno)),
                HypercallReturn::Value(value) => Err(HypfsError::MalformedReply(format!(
                    "unexpected write result {}",
                    value
                ))),
            }
        });
        self.release(path_buf);
        result
    }

    fn read_any(&mut self, op: HypfsOp, path: &str) -> Result<Vec<u8>, HypfsError> {
        let path_buf = self.path_buffer(path)?;
        let result = self.negotiate(op, path, &path_buf);
        self.release(path_buf);
        result
    }

    fn negotiate(
        &mut self,
        op: HypfsOp,
        path: &str,
        path_buf: &BounceBuffer,
    ) -> Result<Vec<u8>, HypfsError> {
        let rounds = self.config.max_negotiation_rounds;
        let mut size = self.config.initial_buffer_size;

        for _ in 0..rounds {
            let out = self.alloc(size)?;
            let args = HypercallArgs {
                cmd: op.code(),
                path: path_buf.addr(),
                path_len: path_buf.len() as u64,
                buf: out.addr(),
                buf_len: size as u64,
            };
            let raw = self.transport.hypercall(HYPERVISOR_HYPFS_OP, args.to_raw());

            let outcome = match HypercallReturn::decode(raw) {
                HypercallReturn::Done => self
                    .transport
                    .read_buffer(&out)
                    .map(Some)
                    .map_err(HypfsError::Transport),
                HypercallReturn::Error(errno) => Err(HypfsError::Hypervisor(errno)),
                HypercallReturn::Value(need) if need <= size as u64 => {
                    Err(HypfsError::ProtocolViolation {
                        offered: size,
                        reported: need,
                    })
                }
                HypercallReturn::Value(need) => {
                    self.log(
                        LogEntry::new(LogLevel::Debug, "reply buffer too small, retrying")
                            .with_field("path", path)
                            .with_field("op", op.name())
                            .with_field("offered", size)
                            .with_field("need", need),
                    );
                    size = usize::try_from(need).unwrap_or(usize::MAX);
                    Ok(None)
                }
            };
            self.release(out);

            if let Some(bytes) = outcome? {
                return Ok(bytes);
            }
        }

        Err(HypfsError::NegotiationExhausted { rounds })
    }

    /// Copies the path into a bounce buffer, NUL included
    fn path_buffer(&mut self, path: &str) -> Result<BounceBuffer, HypfsError> {
        if path.contains('\0') {
            return Err(HypfsError::InvalidArgument(
                "path contains a NUL byte".to_string(),
            ));
        }
        let len = path.len() + 1;
        if len > MAX_PATHLEN {
            return Err(HypfsError::NameTooLong { len });
        }
        self.stage(path)
    }

    /// Allocates a bounce buffer holding `text` and its terminator
    fn stage(&mut self, text: &str) -> Result<BounceBuffer, HypfsError> {
        let buf = self.alloc(text.len() + 1)?;
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        if let Err(errno) = self.transport.write_buffer(&buf, &bytes) {
            self.release(buf);
            return Err(HypfsError::Transport(errno));
        }
        Ok(buf)
    }

    fn alloc(&mut self, size: usize) -> Result<BounceBuffer, HypfsError> {
        self.transport
            .alloc_buffer(size)
            .map_err(|_| HypfsError::OutOfMemory { size })
    }

    /// Frees a bounce buffer without disturbing the error channel
    fn release(&mut self, buf: BounceBuffer) {
        let _saved = ErrnoGuard::save();
        let addr = buf.addr();
        if let Err(errno) = self.transport.free_buffer(buf) {
            self.log(
                LogEntry::new(LogLevel::Warn, "failed to free bounce buffer")
                    .with_field("addr", addr)
                    .with_field("errno", errno.code()),
            );
        }
    }

    /// Publishes a failure on the error channel and the logger
    fn finish<R>(
        &self,
        op: HypfsOp,
        path: &str,
        result: Result<R, HypfsError>,
    ) -> Result<R, HypfsError> {
        if let Err(err) = &result {
            set_last_error(err.errno());
            self.log(
                LogEntry::new(LogLevel::Warn, format!("{} failed: {}", op.name(), err))
                    .with_field("path", path)
                    .with_field("op", op.name())
                    .with_field("errno", err.errno().code()),
            );
        }
        result
    }

    fn log(&self, entry: LogEntry) {
        if self.logger.enabled(entry.level) {
            self.logger.log(entry.with_source(self.id));
        }
    }
}

impl<T: HypercallTransport> Drop for HypfsHandle<T> {
    fn drop(&mut self) {
        self.log(
            LogEntry::new(LogLevel::Debug, "handle closed")
                .with_field("owns_logger", self.owns_logger),
        );
    }
}

/// Appends `name` to a directory path
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}
