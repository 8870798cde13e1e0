//! Process-wide filesystem instance
//!
//! The hypervisor builds its tree at boot, installs it with [`init`] and
//! tears it down with [`shutdown`]. Nothing is constructed lazily on first
//! use.

use crate::dispatcher::Hypfs;
use crate::tree::Tree;
use spin::Mutex;
use std::sync::Arc;
use thiserror::Error;

static INSTANCE: Mutex<Option<Arc<Hypfs>>> = Mutex::new(None);

/// Errors managing the process-wide instance
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GlobalError {
    #[error("Filesystem is already initialized")]
    AlreadyInitialized,
}

/// Installs the filesystem built from `tree`
pub fn init(tree: Tree) -> Result<Arc<Hypfs>, GlobalError> {
    let mut slot = INSTANCE.lock();
    if slot.is_some() {
        return Err(GlobalError::AlreadyInitialized);
    }
    let fs = Arc::new(Hypfs::new(tree));
    *slot = Some(Arc::clone(&fs));
    Ok(fs)
}

/// Returns the installed filesystem, if any
pub fn get() -> Option<Arc<Hypfs>> {
    INSTANCE.lock().clone()
}

/// Uninstalls the filesystem and returns its tree for teardown
///
/// Returns `None` if nothing was installed or if another holder of the
/// instance is still alive; in the latter case the instance is dropped from
/// the slot and the tree goes away with its last holder.
pub fn shutdown() -> Option<Tree> {
    let fs = INSTANCE.lock().take()?;
    Arc::try_unwrap(fs).ok().map(Hypfs::into_tree)
}
