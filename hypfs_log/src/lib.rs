//! # Logger
//!
//! Structured logging for the hypervisor filesystem client library.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style. A
//! library handle is given a [`Logger`] when it is opened; if the caller has
//! none, the library allocates a [`FacadeLogger`] itself and drops it again
//! on close.

use hypfs_abi::HandleId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Source handle (if known)
    pub source: Option<HandleId>,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            source: None,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Sets the source handle
    pub fn with_source(mut self, source: HandleId) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Looks up the value of a field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Renders the fields as `key=value` pairs separated by spaces
    pub fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Sink for structured log entries
pub trait Logger: Send + Sync {
    /// Records an entry. Entries below [`Logger::min_level`] may be dropped.
    fn log(&self, entry: LogEntry);

    /// Lowest level this sink records
    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }

    /// Returns true if an entry at `level` would be recorded
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level()
    }
}

/// Logger forwarding entries to the `log` facade
///
/// Whatever backend the process installed for `log` receives the message
/// with the fields appended.
#[derive(Debug, Clone)]
pub struct FacadeLogger {
    target: &'static str,
    min_level: LogLevel,
}

impl FacadeLogger {
    /// Creates a facade logger for `target` that drops entries below `min_level`
    pub fn new(target: &'static str, min_level: LogLevel) -> Self {
        Self { target, min_level }
    }
}

impl Default for FacadeLogger {
    fn default() -> Self {
        Self::new("hypfs", LogLevel::Info)
    }
}

impl Logger for FacadeLogger {
    fn log(&self, entry: LogEntry) {
        if !self.enabled(entry.level) {
            return;
        }
        let source = entry
            .source
            .map(|id| format!("[{}] ", id))
            .unwrap_or_default();
        let level: log::Level = entry.level.into();
        log::log!(
            target: self.target,
            level,
            "{}{} {}",
            source,
            entry.message,
            entry.render_fields()
        );
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// Logger that keeps every entry in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    /// Creates an empty in-memory logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded entries
    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Checks if an entry matching the predicate exists
    pub fn has_entry<F>(&self, predicate: F) -> bool
    where
        F: Fn(&LogEntry) -> bool,
    {
        self.entries().iter().any(predicate)
    }

    /// Clears all entries
    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Logger for MemoryLogger {
    fn log(&self, entry: LogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
