#![forbid(unsafe_code)]

//! Rewind public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users. It
//! re-exports the history runtime and its building blocks and offers a
//! lightweight prelude for day-to-day usage.
//!
//! # Usage
//!
//! ```ignore
//! use rewind::prelude::*;
//!
//! let history: ActionHistory<i64> = ActionHistory::new(HistoryConfig::new(32));
//! history.on(EventKind::Update, |event| println!("replay {event:?}"));
//!
//! let save = history.append("save", None);
//! history.resolve(save, Some(1));
//! ```

use std::fmt;
use std::path::Path;

// --- Core re-exports -------------------------------------------------------

pub use rewind_core::{
    Action, ActionArena, ActionId, Command, Emitter, Event, ListenerId, NodeId, Status,
    ZipperTree,
};

// --- Runtime re-exports ----------------------------------------------------

pub use rewind_runtime::{
    ActionHistory, ActionTree, Deferred, EventKind, FlushQueue, HistoryConfig, HistoryConfigError,
    HistoryEvent, HistorySnapshot, Immediate, Rejection, Resolver, Updater, Wait, WaitResult,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for rewind apps.
#[derive(Debug)]
pub enum Error {
    /// Configuration could not be loaded or failed validation.
    Config(HistoryConfigError),
    /// An action on the awaited branch was rejected.
    Rejected { action: ActionId, command: Command },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Rejected { action, command } => write!(f, "{action} ({command}) was rejected"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Rejected { .. } => None,
        }
    }
}

impl From<HistoryConfigError> for Error {
    fn from(err: HistoryConfigError) -> Self {
        Self::Config(err)
    }
}

impl<P> From<Rejection<P>> for Error {
    fn from(rejection: Rejection<P>) -> Self {
        Self::Rejected {
            action: rejection.action,
            command: rejection.command,
        }
    }
}

/// Standard result type for rewind APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Config loading --------------------------------------------------------

/// Load and validate a history configuration, picking the format from the
/// file extension.
///
/// `.toml` files need the `policy-config` feature; anything else is read as
/// JSON.
pub fn load_config(path: impl AsRef<Path>) -> Result<HistoryConfig> {
    let path = path.as_ref();
    let config = match path.extension().and_then(|ext| ext.to_str()) {
        #[cfg(feature = "policy-config")]
        Some("toml") => HistoryConfig::from_toml_file(path)?,
        _ => HistoryConfig::from_json_file(path)?,
    };
    Ok(config.validated()?)
}

/// Build a history from a configuration file.
pub fn history_from_file<P: Clone + 'static>(path: impl AsRef<Path>) -> Result<ActionHistory<P>> {
    load_config(path).map(ActionHistory::new)
}

pub mod prelude {
    pub use crate::{
        ActionHistory, ActionId, Command, Error, EventKind, HistoryConfig, HistoryEvent, Result,
        Status, Wait,
    };

    pub use crate::{core, runtime};
}

pub use rewind_core as core;
pub use rewind_runtime as runtime;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io::Write;

    #[test]
    fn json_config_loads_and_validates() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "max_history": 4, "batch": true }}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config, HistoryConfig::new(4).with_batch(true));
    }

    #[test]
    fn zero_history_is_rejected_by_loader() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "max_history": 0 }}"#).unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(HistoryConfigError::Validation(_))));
        assert!(err.source().is_some());
    }

    #[test]
    fn history_from_file_applies_config() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "max_history": 7 }}"#).unwrap();

        let history: ActionHistory<u8> = history_from_file(file.path()).unwrap();
        assert_eq!(history.limit(), 7);
    }

    #[test]
    fn rejection_converts_with_question_mark() {
        fn settle(history: &ActionHistory<u8>) -> Result<()> {
            history.wait().result().unwrap_or(Ok(()))?;
            Ok(())
        }

        let history: ActionHistory<u8> = ActionHistory::new(HistoryConfig::unlimited());
        let a = history.append("save", None);
        history.reject(a, Some(9));

        let err = settle(&history).unwrap_err();
        assert_eq!(err.to_string(), format!("{a} (save) was rejected"));
    }

    #[test]
    fn prelude_is_usable() {
        use crate::prelude::*;

        let history: ActionHistory<()> = ActionHistory::default();
        assert_eq!(history.size(), 1);
        assert!(history.action(history.head().unwrap()).unwrap().is(Status::Resolve));
    }
}
