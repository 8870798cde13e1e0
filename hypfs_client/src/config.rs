//! Client configuration

use hypfs_abi::Errno;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Tunables of the size-negotiation loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Size of the first reply buffer offered to the hypervisor
    pub initial_buffer_size: usize,
    /// Hypercalls allowed per read before giving up
    pub max_negotiation_rounds: u32,
}

impl ClientConfig {
    pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 4096;
    pub const DEFAULT_MAX_NEGOTIATION_ROUNDS: u32 = 8;

    /// Checks that the loop can make progress
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "initial_buffer_size must be positive".to_string(),
            ));
        }
        if self.max_negotiation_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_negotiation_rounds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a configuration; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| ConfigError::DeserializationFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: Self::DEFAULT_INITIAL_BUFFER_SIZE,
            max_negotiation_rounds: Self::DEFAULT_MAX_NEGOTIATION_ROUNDS,
        }
    }
}

/// Errors loading a client configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to deserialize config: {0}")]
    DeserializationFailed(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn errno(&self) -> Errno {
        match self {
            ConfigError::ReadFailed { .. } => Errno::Io,
            ConfigError::DeserializationFailed(_) | ConfigError::Invalid(_) => {
                Errno::InvalidArgument
            }
        }
    }
}
