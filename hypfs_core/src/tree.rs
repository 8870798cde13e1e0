//! Tree store
//!
//! Entries live in a single arena owned by [`Tree`] and refer to each other
//! by [`EntryId`]. A directory owns the ordered list of its children's ids;
//! the parent link of an entry is a lookup aid only.
//!
//! Every directory caches `content_size`, the exact number of bytes a
//! directory read emits. It changes only when a child is added, never when
//! a leaf value is replaced.

use crate::path::{split_first, validate_name};
use hypfs_abi::{direntry_size, DirEntryHeader, Errno, HYPFS_ISDIR};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Index of an entry in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(usize);

impl EntryId {
    /// The root directory
    pub const ROOT: EntryId = EntryId(0);

    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors registering or updating entries
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("Entry name of {len} bytes is too long")]
    NameTooLong { len: usize },

    #[error("Leaf value contains a NUL byte")]
    InvalidValue,

    #[error("Leaf {0} has no value")]
    MissingPayload(String),

    #[error("Payload of {0} does not match its kind")]
    KindMismatch(String),

    #[error("Directory body for {0} already has children")]
    PopulatedBody(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Leaf is read-only: {0}")]
    ReadOnly(String),

    #[error("No entry {0}")]
    NoSuchEntry(EntryId),

    #[error("Directory {0} cannot grow further")]
    DirectoryFull(String),
}

impl TreeError {
    /// Numeric error reported to callers
    pub fn errno(&self) -> Errno {
        match self {
            TreeError::InvalidName(_)
            | TreeError::InvalidValue
            | TreeError::MissingPayload(_)
            | TreeError::KindMismatch(_)
            | TreeError::PopulatedBody(_) => Errno::InvalidArgument,
            TreeError::NameTooLong { .. } => Errno::NameTooLong,
            TreeError::AlreadyExists(_) => Errno::AlreadyExists,
            TreeError::NotADirectory(_) => Errno::NotADirectory,
            TreeError::IsDirectory(_) => Errno::IsDirectory,
            TreeError::ReadOnly(_) => Errno::AccessDenied,
            TreeError::NoSuchEntry(_) => Errno::NotFound,
            TreeError::DirectoryFull(_) => Errno::OutOfMemory,
        }
    }
}

/// Variant tag of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    StringLeaf,
}

/// Ordered children of a directory and their cached wire size
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirBody {
    children: Vec<EntryId>,
    content_size: u32,
}

impl DirBody {
    /// Creates an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Children in ascending name order
    pub fn children(&self) -> &[EntryId] {
        &self.children
    }

    /// Bytes a directory read emits
    pub fn content_size(&self) -> u32 {
        self.content_size
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Value of a string leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    value: String,
    writable: bool,
}

impl Leaf {
    /// A leaf privileged callers may overwrite
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            writable: true,
        }
    }

    /// A leaf whose value is fixed after registration
    pub fn readonly(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            writable: false,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Value length plus the terminating NUL
    pub fn content_len(&self) -> u32 {
        u32::try_from(self.value.len() + 1).unwrap_or(u32::MAX)
    }
}

/// Shape-specific data of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Directory(DirBody),
    StringLeaf(Leaf),
}

impl Payload {
    pub fn kind(&self) -> EntryKind {
        match self {
            Payload::Directory(_) => EntryKind::Directory,
            Payload::StringLeaf(_) => EntryKind::StringLeaf,
        }
    }
}

/// A node of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    parent: Option<EntryId>,
    payload: Payload,
}

impl Entry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Containing directory; `None` only for the root
    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    /// Leaf value, `None` for directories
    pub fn value(&self) -> Option<&str> {
        match &self.payload {
            Payload::StringLeaf(leaf) => Some(leaf.value()),
            Payload::Directory(_) => None,
        }
    }

    /// The `content_len` field of this entry's directory record
    pub fn content_len(&self) -> u32 {
        match &self.payload {
            Payload::Directory(body) => body.content_size,
            Payload::StringLeaf(leaf) => leaf.content_len(),
        }
    }
}

/// The rooted entry tree
#[derive(Debug)]
pub struct Tree {
    entries: Vec<Entry>,
}

impl Tree {
    /// Creates a tree holding only the root directory
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                name: String::new(),
                parent: None,
                payload: Payload::Directory(DirBody::new()),
            }],
        }
    }

    pub fn root(&self) -> EntryId {
        EntryId::ROOT
    }

    /// Number of entries including the root
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    /// Children of a directory in stored order
    pub fn children(&self, dir: EntryId) -> Option<&[EntryId]> {
        self.dir_body(dir).ok().map(DirBody::children)
    }

    /// Cached wire size of a directory
    pub fn content_size(&self, dir: EntryId) -> Option<u32> {
        self.dir_body(dir).ok().map(DirBody::content_size)
    }

    /// Inserts an entry under `parent`
    ///
    /// A directory registered without a payload gets an empty body; a leaf
    /// without one is rejected. Siblings stay in ascending byte order and
    /// the parent's `content_size` grows by the new record's size. A
    /// failed insertion leaves the tree untouched.
    pub fn new_entry(
        &mut self,
        parent: EntryId,
        name: &str,
        kind: EntryKind,
        payload: Option<Payload>,
    ) -> Result<EntryId, TreeError> {
        validate_name(name)?;
        let payload = match payload {
            None if kind == EntryKind::Directory => Payload::Directory(DirBody::new()),
            None => return Err(TreeError::MissingPayload(name.to_string())),
            Some(payload) if payload.kind() != kind => {
                return Err(TreeError::KindMismatch(name.to_string()))
            }
            Some(payload) => payload,
        };
        match &payload {
            Payload::Directory(body) if !body.is_empty() => {
                return Err(TreeError::PopulatedBody(name.to_string()))
            }
            Payload::StringLeaf(leaf) => validate_value(leaf.value())?,
            Payload::Directory(_) => {}
        }

        let position = self.insert_position(parent, name)?;
        let grown = self
            .dir_body(parent)?
            .content_size
            .checked_add(record_size(name))
            .ok_or_else(|| TreeError::DirectoryFull(self.display_path(parent)))?;

        let id = EntryId(self.entries.len());
        self.entries.push(Entry {
            name: name.to_string(),
            parent: Some(parent),
            payload,
        });
        let body = self.dir_body_mut(parent)?;
        body.children.insert(position, id);
        body.content_size = grown;
        Ok(id)
    }

    /// Registers a writable string leaf
    pub fn new_string_leaf(
        &mut self,
        parent: EntryId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<EntryId, TreeError> {
        self.new_entry(
            parent,
            name,
            EntryKind::StringLeaf,
            Some(Payload::StringLeaf(Leaf::new(value))),
        )
    }

    /// Registers a string leaf that rejects writes
    pub fn new_readonly_string_leaf(
        &mut self,
        parent: EntryId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<EntryId, TreeError> {
        self.new_entry(
            parent,
            name,
            EntryKind::StringLeaf,
            Some(Payload::StringLeaf(Leaf::readonly(value))),
        )
    }

    /// Registers a directory, with an empty body unless one is supplied
    pub fn new_dir(
        &mut self,
        parent: EntryId,
        name: &str,
        body: Option<DirBody>,
    ) -> Result<EntryId, TreeError> {
        self.new_entry(
            parent,
            name,
            EntryKind::Directory,
            body.map(Payload::Directory),
        )
    }

    /// Resolves an absolute path
    ///
    /// `/` is the root. A trailing separator after the last component is
    /// accepted. Returns `None` for relative paths, missing components and
    /// attempts to descend into a leaf.
    pub fn get_entry(&self, path: &str) -> Option<EntryId> {
        let mut rest = path.strip_prefix('/')?;
        let mut current = EntryId::ROOT;
        loop {
            if rest.is_empty() {
                return Some(current);
            }
            let body = match &self.entry(current)?.payload {
                Payload::Directory(body) => body,
                Payload::StringLeaf(_) => return None,
            };
            let (component, remainder) = split_first(rest);
            let child = self.find_child(body, component)?;
            match remainder {
                Some(remainder) => {
                    current = child;
                    rest = remainder;
                }
                None => return Some(child),
            }
        }
    }

    /// Child of `dir` called `name`, if any
    pub fn lookup_child(&self, dir: EntryId, name: &str) -> Option<EntryId> {
        let body = self.dir_body(dir).ok()?;
        self.find_child(body, name)
    }

    /// Absolute path of an entry; the root is `/`
    pub fn path_of(&self, id: EntryId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.entry(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.entry(parent)?;
        }
        names.reverse();
        Some(format!("/{}", names.join("/")))
    }

    /// Directory records of `dir` in stored order
    ///
    /// The last record has `off_next == 0`; every other record points just
    /// past itself.
    pub fn dir_records(
        &self,
        dir: EntryId,
    ) -> Result<impl Iterator<Item = (DirEntryHeader, &str)> + '_, TreeError> {
        let body = self.dir_body(dir)?;
        let last = body.children.len().saturating_sub(1);
        Ok(body
            .children
            .iter()
            .enumerate()
            .filter_map(move |(index, child)| {
                let entry = self.entry(*child)?;
                let header = DirEntryHeader {
                    flags: if entry.is_dir() { HYPFS_ISDIR } else { 0 },
                    content_len: entry.content_len(),
                    off_next: if index == last {
                        0
                    } else {
                        record_size(&entry.name)
                    },
                };
                Some((header, entry.name.as_str()))
            }))
    }

    /// Replaces the value of a writable leaf
    pub fn write_leaf(&mut self, id: EntryId, value: String) -> Result<(), TreeError> {
        let path = self.display_path(id);
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(TreeError::NoSuchEntry(id))?;
        match &mut entry.payload {
            Payload::Directory(_) => Err(TreeError::IsDirectory(path)),
            Payload::StringLeaf(leaf) if !leaf.writable => Err(TreeError::ReadOnly(path)),
            Payload::StringLeaf(leaf) => {
                validate_value(&value)?;
                leaf.value = value;
                Ok(())
            }
        }
    }

    fn find_child(&self, body: &DirBody, name: &str) -> Option<EntryId> {
        for child in &body.children {
            match self.entry(*child)?.name.as_str().cmp(name) {
                Ordering::Less => continue,
                Ordering::Equal => return Some(*child),
                Ordering::Greater => return None,
            }
        }
        None
    }

    fn insert_position(&self, parent: EntryId, name: &str) -> Result<usize, TreeError> {
        let body = self.dir_body(parent)?;
        for (index, child) in body.children.iter().enumerate() {
            let sibling = self.entry(*child).ok_or(TreeError::NoSuchEntry(*child))?;
            match sibling.name.as_str().cmp(name) {
                Ordering::Less => {}
                Ordering::Equal => return Err(TreeError::AlreadyExists(name.to_string())),
                Ordering::Greater => return Ok(index),
            }
        }
        Ok(body.children.len())
    }

    fn dir_body(&self, id: EntryId) -> Result<&DirBody, TreeError> {
        let entry = self.entry(id).ok_or(TreeError::NoSuchEntry(id))?;
        match &entry.payload {
            Payload::Directory(body) => Ok(body),
            Payload::StringLeaf(_) => Err(TreeError::NotADirectory(self.display_path(id))),
        }
    }

    fn dir_body_mut(&mut self, id: EntryId) -> Result<&mut DirBody, TreeError> {
        let path = self.display_path(id);
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(TreeError::NoSuchEntry(id))?;
        match &mut entry.payload {
            Payload::Directory(body) => Ok(body),
            Payload::StringLeaf(_) => Err(TreeError::NotADirectory(path)),
        }
    }

    fn display_path(&self, id: EntryId) -> String {
        self.path_of(id).unwrap_or_else(|| id.to_string())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

fn record_size(name: &str) -> u32 {
    // names are capped at MAX_NAME, so a record always fits
    direntry_size(name.len()) as u32
}

fn validate_value(value: &str) -> Result<(), TreeError> {
    if value.contains('\0') {
        return Err(TreeError::InvalidValue);
    }
    Ok(())
}
