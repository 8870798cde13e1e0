//! Numeric error codes and the hypercall return convention

use serde::{Deserialize, Serialize};
use std::fmt;

/// Conventional numeric error codes
///
/// The discriminants are the values seen on the wire (negated) and in the
/// client's numeric error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Errno {
    /// Caller is not allowed to use the interface (EPERM)
    PermissionDenied = 1,
    /// No entry at the given path (ENOENT)
    NotFound = 2,
    /// Internal or protocol failure (EIO)
    Io = 5,
    /// Handle is not open (EBADF)
    BadHandle = 9,
    /// Allocation failed or size negotiation did not converge (ENOMEM)
    OutOfMemory = 12,
    /// Entry does not permit the requested access (EACCES)
    AccessDenied = 13,
    /// Copy between address spaces failed (EFAULT)
    BadAddress = 14,
    /// Name already present in the directory (EEXIST)
    AlreadyExists = 17,
    /// Operation needs a directory (ENOTDIR)
    NotADirectory = 20,
    /// Operation needs a leaf (EISDIR)
    IsDirectory = 21,
    /// Malformed argument (EINVAL)
    InvalidArgument = 22,
    /// Path or name exceeds its limit (ENAMETOOLONG)
    NameTooLong = 36,
    /// Unknown opcode (ENOSYS)
    NotImplemented = 38,
}

impl Errno {
    /// Returns the positive numeric code
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decodes a positive numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        let errno = match code {
            1 => Errno::PermissionDenied,
            2 => Errno::NotFound,
            5 => Errno::Io,
            9 => Errno::BadHandle,
            12 => Errno::OutOfMemory,
            13 => Errno::AccessDenied,
            14 => Errno::BadAddress,
            17 => Errno::AlreadyExists,
            20 => Errno::NotADirectory,
            21 => Errno::IsDirectory,
            22 => Errno::InvalidArgument,
            36 => Errno::NameTooLong,
            38 => Errno::NotImplemented,
            _ => return None,
        };
        Some(errno)
    }

    /// Returns the canonical symbolic name
    pub fn symbol(self) -> &'static str {
        match self {
            Errno::PermissionDenied => "EPERM",
            Errno::NotFound => "ENOENT",
            Errno::Io => "EIO",
            Errno::BadHandle => "EBADF",
            Errno::OutOfMemory => "ENOMEM",
            Errno::AccessDenied => "EACCES",
            Errno::BadAddress => "EFAULT",
            Errno::AlreadyExists => "EEXIST",
            Errno::NotADirectory => "ENOTDIR",
            Errno::IsDirectory => "EISDIR",
            Errno::InvalidArgument => "EINVAL",
            Errno::NameTooLong => "ENAMETOOLONG",
            Errno::NotImplemented => "ENOSYS",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Errno::PermissionDenied => "Operation not permitted",
            Errno::NotFound => "No such file or directory",
            Errno::Io => "Input/output error",
            Errno::BadHandle => "Bad file descriptor",
            Errno::OutOfMemory => "Cannot allocate memory",
            Errno::AccessDenied => "Permission denied",
            Errno::BadAddress => "Bad address",
            Errno::AlreadyExists => "File exists",
            Errno::NotADirectory => "Not a directory",
            Errno::IsDirectory => "Is a directory",
            Errno::InvalidArgument => "Invalid argument",
            Errno::NameTooLong => "File name too long",
            Errno::NotImplemented => "Function not implemented",
        };
        write!(f, "{} ({})", text, self.symbol())
    }
}

/// Decoded hypercall return value
///
/// On the wire a hypercall returns a signed integer: negative values are
/// negated [`Errno`] codes, zero is success and positive values carry a
/// number whose meaning depends on the opcode (required buffer size for
/// reads, interface version for `GetVersion`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HypercallReturn {
    /// Operation completed
    Done,
    /// Positive value reported by the hypervisor
    Value(u64),
    /// Operation failed
    Error(Errno),
}

impl HypercallReturn {
    /// Encodes into the raw signed return value
    pub fn encode(self) -> i64 {
        match self {
            HypercallReturn::Done => 0,
            HypercallReturn::Value(v) => i64::try_from(v).unwrap_or(i64::MAX),
            HypercallReturn::Error(errno) => -i64::from(errno.code()),
        }
    }

    /// Decodes a raw signed return value
    ///
    /// Negative values outside the known taxonomy decode as [`Errno::Io`].
    pub fn decode(raw: i64) -> Self {
        match raw {
            0 => HypercallReturn::Done,
            v if v > 0 => HypercallReturn::Value(v as u64),
            v => {
                let errno = v
                    .checked_neg()
                    .and_then(|code| i32::try_from(code).ok())
                    .and_then(Errno::from_code)
                    .unwrap_or(Errno::Io);
                HypercallReturn::Error(errno)
            }
        }
    }
}

impl From<Errno> for HypercallReturn {
    fn from(errno: Errno) -> Self {
        HypercallReturn::Error(errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Errno; 13] = [
        Errno::PermissionDenied,
        Errno::NotFound,
        Errno::Io,
        Errno::BadHandle,
        Errno::OutOfMemory,
        Errno::AccessDenied,
        Errno::BadAddress,
        Errno::AlreadyExists,
        Errno::NotADirectory,
        Errno::IsDirectory,
        Errno::InvalidArgument,
        Errno::NameTooLong,
        Errno::NotImplemented,
    ];

    #[test]
    fn test_every_code_decodes_back() {
        for errno in ALL {
            assert_eq!(Errno::from_code(errno.code()), Some(errno));
        }
        assert_eq!(Errno::from_code(0), None);
        assert_eq!(Errno::from_code(4242), None);
    }

    #[test]
    fn test_conventional_values() {
        assert_eq!(Errno::PermissionDenied.code(), 1);
        assert_eq!(Errno::NotFound.code(), 2);
        assert_eq!(Errno::BadAddress.code(), 14);
        assert_eq!(Errno::NotImplemented.code(), 38);
    }

    #[test]
    fn test_return_encoding() {
        assert_eq!(HypercallReturn::Done.encode(), 0);
        assert_eq!(HypercallReturn::Value(3).encode(), 3);
        assert_eq!(HypercallReturn::Error(Errno::NotFound).encode(), -2);
    }

    #[test]
    fn test_return_decoding() {
        assert_eq!(HypercallReturn::decode(0), HypercallReturn::Done);
        assert_eq!(HypercallReturn::decode(4096), HypercallReturn::Value(4096));
        assert_eq!(
            HypercallReturn::decode(-21),
            HypercallReturn::Error(Errno::IsDirectory)
        );
        assert_eq!(
            HypercallReturn::decode(-999),
            HypercallReturn::Error(Errno::Io)
        );
        assert_eq!(
            HypercallReturn::decode(i64::MIN),
            HypercallReturn::Error(Errno::Io)
        );
    }

    #[test]
    fn test_display_includes_symbol() {
        let text = Errno::NotADirectory.to_string();
        assert!(text.contains("ENOTDIR"));
    }
}
