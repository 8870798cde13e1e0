//! Per-thread numeric error channel
//!
//! Every failed library call leaves its [`Errno`] here, mirroring the
//! conventional `errno` variable. Successful calls leave the channel as they
//! found it, even though they may free buffers through a transport that
//! touches it.

use hypfs_abi::Errno;
use std::cell::Cell;

thread_local! {
    static LAST_ERROR: Cell<Option<Errno>> = const { Cell::new(None) };
}

/// Error left by the most recent failing call on this thread
pub fn last_error() -> Option<Errno> {
    LAST_ERROR.with(Cell::get)
}

/// Records `errno` as this thread's last error
pub fn set_last_error(errno: Errno) {
    LAST_ERROR.with(|cell| cell.set(Some(errno)));
}

/// Resets this thread's last error
pub fn clear_last_error() {
    LAST_ERROR.with(|cell| cell.set(None));
}

/// Saves the error channel and restores it when dropped
///
/// Wrap cleanup that may clobber the channel:
///
/// ```
/// use hypfs_abi::Errno;
/// use hypfs_client::errno::{last_error, set_last_error, ErrnoGuard};
///
/// set_last_error(Errno::NotFound);
/// {
///     let _saved = ErrnoGuard::save();
///     set_last_error(Errno::BadHandle);
/// }
/// assert_eq!(last_error(), Some(Errno::NotFound));
/// ```
#[derive(Debug)]
#[must_use = "the channel is restored when the guard drops"]
pub struct ErrnoGuard {
    saved: Option<Errno>,
}

impl ErrnoGuard {
    /// Captures the current value
    pub fn save() -> Self {
        Self {
            saved: last_error(),
        }
    }

    /// The captured value
    pub fn saved(&self) -> Option<Errno> {
        self.saved
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        let saved = self.saved;
        LAST_ERROR.with(|cell| cell.set(saved));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        clear_last_error();
        assert_eq!(last_error(), None);
        set_last_error(Errno::OutOfMemory);
        assert_eq!(last_error(), Some(Errno::OutOfMemory));
        clear_last_error();
        assert_eq!(last_error(), None);
    }

    #[test]
    fn test_guard_restores_none() {
        clear_last_error();
        {
            let guard = ErrnoGuard::save();
            assert_eq!(guard.saved(), None);
            set_last_error(Errno::Io);
        }
        assert_eq!(last_error(), None);
    }

    #[test]
    fn test_channel_is_per_thread() {
        set_last_error(Errno::NotFound);
        let other = std::thread::spawn(last_error).join().unwrap();
        assert_eq!(other, None);
        assert_eq!(last_error(), Some(Errno::NotFound));
    }
}
