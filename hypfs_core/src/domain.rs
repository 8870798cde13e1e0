//! Calling domains and their privilege

use hypfs_abi::DomainId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a domain plays in the system
///
/// The role is structural information set when the domain is built; it is
/// the only input to filesystem authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainRole {
    /// Administers other domains
    Control,
    /// Owns the physical devices
    Hardware,
    /// Ordinary guest
    Guest,
}

/// The domain on whose behalf a hypercall executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// Domain identifier
    pub domain: DomainId,
    /// Domain role
    pub role: DomainRole,
}

impl Caller {
    /// Creates a caller
    pub fn new(domain: DomainId, role: DomainRole) -> Self {
        Self { domain, role }
    }

    /// The initial control domain
    pub fn control() -> Self {
        Self::new(DomainId::CONTROL, DomainRole::Control)
    }

    /// A hardware domain
    pub fn hardware(domain: DomainId) -> Self {
        Self::new(domain, DomainRole::Hardware)
    }

    /// An unprivileged guest
    pub fn guest(domain: DomainId) -> Self {
        Self::new(domain, DomainRole::Guest)
    }

    /// Only the control and hardware domains may use the filesystem
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, DomainRole::Control | DomainRole::Hardware)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.domain, self.role)
    }
}
