//! Boot manifest
//!
//! Describes the initial tree as JSON so a hypervisor build (or a test) can
//! populate the filesystem without hand-written registration code:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": [
//!     { "path": "/buildinfo/version", "value": "4.19", "writable": false },
//!     { "path": "/params/console", "value": "com1" },
//!     { "path": "/cpupool" }
//!   ]
//! }
//! ```
//!
//! Records are applied in order. Directories named by a path prefix are
//! created on demand; a record without a value is a directory.

use crate::path::components;
use crate::tree::{EntryId, Tree, TreeError};
use hypfs_abi::Errno;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// One entry to register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Absolute path of the entry
    pub path: String,
    /// Leaf value; absent for a directory
    #[serde(default)]
    pub value: Option<String>,
    /// Whether privileged callers may overwrite the leaf (default true)
    #[serde(default)]
    pub writable: Option<bool>,
}

impl ManifestEntry {
    /// A writable leaf
    pub fn leaf(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: Some(value.into()),
            writable: None,
        }
    }

    /// A read-only leaf
    pub fn readonly_leaf(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: Some(value.into()),
            writable: Some(false),
        }
    }

    /// A directory
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
            writable: None,
        }
    }
}

/// Versioned list of entries making up the boot-time tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeManifest {
    /// Format version
    pub version: u32,
    /// Entries in registration order
    pub entries: Vec<ManifestEntry>,
}

impl TreeManifest {
    /// Current version of the manifest format
    pub const CURRENT_VERSION: u32 = 1;

    /// Creates a manifest from entries
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries,
        }
    }

    /// Parses a manifest from JSON text
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: TreeManifest = serde_json::from_str(json)
            .map_err(|e| ManifestError::DeserializationFailed(e.to_string()))?;

        if manifest.version != Self::CURRENT_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }

        Ok(manifest)
    }

    /// Reads and parses a manifest file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ManifestError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Serializes the manifest to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ManifestError::SerializationFailed(e.to_string()))
    }
}

/// Errors loading or applying a manifest
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to deserialize manifest: {0}")]
    DeserializationFailed(String),

    #[error("Failed to serialize manifest: {0}")]
    SerializationFailed(String),

    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid manifest path: {0:?}")]
    InvalidPath(String),

    #[error("Failed to register {path}: {source}")]
    Registration { path: String, source: TreeError },
}

impl ManifestError {
    /// Numeric error reported to callers
    pub fn errno(&self) -> Errno {
        match self {
            ManifestError::ReadFailed { .. } => Errno::Io,
            ManifestError::Registration { source, .. } => source.errno(),
            _ => Errno::InvalidArgument,
        }
    }
}

impl Tree {
    /// Builds a tree from a manifest
    pub fn from_manifest(manifest: &TreeManifest) -> Result<Tree, ManifestError> {
        if manifest.version != TreeManifest::CURRENT_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }

        let mut tree = Tree::new();
        for record in &manifest.entries {
            tree.apply(record)?;
        }
        Ok(tree)
    }

    fn apply(&mut self, record: &ManifestEntry) -> Result<EntryId, ManifestError> {
        let registration = |source: TreeError| ManifestError::Registration {
            path: record.path.clone(),
            source,
        };

        let parts = components(&record.path)
            .ok_or_else(|| ManifestError::InvalidPath(record.path.clone()))?;
        let Some((name, parents)) = parts.split_last() else {
            return Err(ManifestError::InvalidPath(record.path.clone()));
        };

        let mut dir = EntryId::ROOT;
        for component in parents {
            dir = match self.lookup_child(dir, component) {
                Some(existing) => existing,
                None => self.new_dir(dir, component, None).map_err(registration)?,
            };
        }

        let registered = match &record.value {
            Some(value) if record.writable.unwrap_or(true) => {
                self.new_string_leaf(dir, name, value.as_str())
            }
            Some(value) => self.new_readonly_string_leaf(dir, name, value.as_str()),
            None => match self.lookup_child(dir, name) {
                // Already created as a prefix of an earlier record
                Some(existing) if self.entry(existing).is_some_and(|e| e.is_dir()) => {
                    Ok(existing)
                }
                _ => self.new_dir(dir, name, None),
            },
        };
        registered.map_err(registration)
    }
}
