//! Names and paths
//!
//! Paths are absolute and literal: no `.` or `..` handling, no case folding.

use crate::tree::TreeError;
use hypfs_abi::MAX_NAME;

/// Checks that `name` can label a tree entry
///
/// A name is 1..=[`MAX_NAME`] bytes and contains neither `/` nor NUL.
pub fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    if name.len() > MAX_NAME {
        return Err(TreeError::NameTooLong { len: name.len() });
    }
    Ok(())
}

/// Splits the first component off a path relative to some directory
///
/// Returns the component and the remainder after the separator, or `None`
/// for the remainder when the component was the last one.
///
/// ```
/// use hypfs_core::path::split_first;
///
/// assert_eq!(split_first("a/b/c"), ("a", Some("b/c")));
/// assert_eq!(split_first("a/"), ("a", Some("")));
/// assert_eq!(split_first("a"), ("a", None));
/// ```
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Splits an absolute path into its components
///
/// Returns `None` if the path is relative or contains an empty component.
/// The root path `/` has no components.
pub fn components(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    Some(parts)
}
