//! Directory record wire format
//!
//! A directory read fills the caller's buffer with one record per child, in
//! the directory's stored order:
//!
//! | field         | size  | meaning                                             |
//! |---------------|-------|-----------------------------------------------------|
//! | `flags`       | u32   | [`HYPFS_ISDIR`] set iff the child is a directory    |
//! | `content_len` | u32   | leaf: value length + 1; directory: its content size |
//! | `off_next`    | u32   | offset to the next record, 0 on the last record     |
//! | `name`        | bytes | NUL-terminated, NUL-padded to a 4-byte boundary     |
//!
//! All integers are in host byte order.

use crate::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flag bit marking a directory child
pub const HYPFS_ISDIR: u32 = 0x0001;

/// Size of the fixed record header in bytes
pub const DIRENTRY_HEADER_SIZE: usize = 12;

/// Alignment of the padded name field
pub const DIRENTRY_NAME_ALIGN: usize = 4;

/// Rounds `value` up to a multiple of `align` (a power of two)
pub const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Returns the on-wire size of a record whose name is `name_len` bytes long
/// (without the NUL)
pub const fn direntry_size(name_len: usize) -> usize {
    DIRENTRY_HEADER_SIZE + round_up(name_len + 1, DIRENTRY_NAME_ALIGN)
}

/// Errors decoding directory records
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A record header or name runs past the end of the buffer
    #[error("Directory record at offset {offset} is truncated")]
    Truncated { offset: usize },

    /// A name is missing its NUL terminator
    #[error("Directory record at offset {offset} has an unterminated name")]
    UnterminatedName { offset: usize },

    /// A name is empty or not valid UTF-8
    #[error("Directory record at offset {offset} has an invalid name")]
    InvalidName { offset: usize },

    /// `off_next` does not point past the current record
    #[error("Directory record at offset {offset} has a bad next offset {off_next}")]
    BadNextOffset { offset: usize, off_next: u32 },
}

impl WireError {
    /// Numeric error reported for a malformed reply
    pub fn errno(&self) -> Errno {
        Errno::Io
    }
}

/// Fixed header of a directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryHeader {
    /// Flag bits ([`HYPFS_ISDIR`])
    pub flags: u32,
    /// Size of the child's content on the wire
    pub content_len: u32,
    /// Offset from this record to the next, 0 for the last record
    pub off_next: u32,
}

impl DirEntryHeader {
    /// Returns true if the record describes a directory
    pub fn is_dir(&self) -> bool {
        self.flags & HYPFS_ISDIR != 0
    }

    /// Encodes the header in host byte order
    pub fn to_bytes(&self) -> [u8; DIRENTRY_HEADER_SIZE] {
        let mut out = [0u8; DIRENTRY_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.flags.to_ne_bytes());
        out[4..8].copy_from_slice(&self.content_len.to_ne_bytes());
        out[8..12].copy_from_slice(&self.off_next.to_ne_bytes());
        out
    }

    /// Decodes a header from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < DIRENTRY_HEADER_SIZE {
            return None;
        }
        let word = |at: usize| u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Some(Self {
            flags: word(0),
            content_len: word(4),
            off_next: word(8),
        })
    }

    /// Encodes a complete record (header, name, NUL padding)
    pub fn encode_record(&self, name: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(direntry_size(name.len()));
        out.extend_from_slice(&self.to_bytes());
        out.extend_from_slice(name.as_bytes());
        out.resize(direntry_size(name.len()), 0);
        out
    }
}

/// One decoded directory record borrowing its name from the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirRecord<'a> {
    /// Byte offset of the record within the buffer
    pub offset: usize,
    /// Decoded header
    pub header: DirEntryHeader,
    /// Child name
    pub name: &'a str,
}

impl DirRecord<'_> {
    /// Returns true if the record describes a directory
    pub fn is_dir(&self) -> bool {
        self.header.is_dir()
    }
}

/// Walks the records of a directory read by following `off_next`
///
/// An all-zero buffer of any length, or one whose first record has an
/// all-zero header and an empty name, is an empty directory and yields
/// nothing. Iteration stops after the first error.
#[derive(Debug, Clone)]
pub struct DirRecords<'a> {
    buf: &'a [u8],
    next: Option<usize>,
}

impl<'a> DirRecords<'a> {
    /// Creates a walker over a filled directory buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, next: Some(0) }
    }

    fn decode_at(&self, offset: usize) -> Result<Option<DirRecord<'a>>, WireError> {
        // the reply buffer may be smaller than one header
        if offset == 0 && self.buf.iter().all(|b| *b == 0) {
            return Ok(None);
        }

        let header = self
            .buf
            .get(offset..)
            .and_then(DirEntryHeader::from_bytes)
            .ok_or(WireError::Truncated { offset })?;

        let name_start = offset + DIRENTRY_HEADER_SIZE;
        let tail = &self.buf[name_start..];
        let nul = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(WireError::UnterminatedName { offset })?;

        if nul == 0 {
            let empty_header = header.flags == 0 && header.content_len == 0 && header.off_next == 0;
            if offset == 0 && empty_header {
                return Ok(None);
            }
            return Err(WireError::InvalidName { offset });
        }

        let name =
            std::str::from_utf8(&tail[..nul]).map_err(|_| WireError::InvalidName { offset })?;

        if header.off_next != 0 && (header.off_next as usize) < direntry_size(name.len()) {
            return Err(WireError::BadNextOffset {
                offset,
                off_next: header.off_next,
            });
        }

        Ok(Some(DirRecord {
            offset,
            header,
            name,
        }))
    }
}

impl<'a> Iterator for DirRecords<'a> {
    type Item = Result<DirRecord<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        match self.decode_at(offset) {
            Ok(Some(record)) => {
                if record.header.off_next != 0 {
                    self.next = Some(offset + record.header.off_next as usize);
                }
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
