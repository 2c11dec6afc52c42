#![forbid(unsafe_code)]

//! History configuration.
//!
//! [`HistoryConfig`] carries the retention ceiling and the batching switch.
//! It can be built in code or loaded from TOML or JSON at startup.
//!
//! # Loading
//!
//! ```toml
//! # rewind.toml
//! max_history = 64
//! batch = true
//! ```
//!
//! ```rust,ignore
//! let config = HistoryConfig::from_toml_file("rewind.toml")?;
//! let config = HistoryConfig::from_json_str(r#"{ "max_history": 8 }"#)?;
//! ```
//!
//! # Defaults
//!
//! `max_history = 1` keeps only the newest completed action around, and
//! `batch = false` flushes every release synchronously.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Construction options for an `ActionHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of completed actions kept on the active branch.
    /// Values below 1 are treated as 1.
    pub max_history: usize,
    /// Defer release notifications until the owner flushes them.
    pub batch: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: 1,
            batch: false,
        }
    }
}

impl HistoryConfig {
    /// Create a configuration with a custom retention ceiling.
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            ..Self::default()
        }
    }

    /// Keep every action (for debugging and time travel tooling).
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Set whether releases are batched.
    #[must_use]
    pub fn with_batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Effective retention limit, never below 1.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.max_history.max(1)
    }

    /// Load from a TOML string.
    #[cfg(any(feature = "policy-config", test))]
    pub fn from_toml_str(s: &str) -> Result<Self, HistoryConfigError> {
        toml::from_str(s).map_err(HistoryConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(any(feature = "policy-config", test))]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, HistoryConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HistoryConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, HistoryConfigError> {
        serde_json::from_str(s).map_err(HistoryConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, HistoryConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HistoryConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Validate parameters.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_history == 0 {
            errors.push("max_history must be > 0 (0 is treated as 1)".into());
        }
        errors
    }

    /// Return `self` if [`validate`](Self::validate) finds nothing.
    pub fn validated(self) -> Result<Self, HistoryConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(HistoryConfigError::Validation(errors))
        }
    }
}

/// Errors that can occur when loading a history configuration.
#[derive(Debug)]
pub enum HistoryConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(any(feature = "policy-config", test))]
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for HistoryConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(any(feature = "policy-config", test))]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for HistoryConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(any(feature = "policy-config", test))]
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
