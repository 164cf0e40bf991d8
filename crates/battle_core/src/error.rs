//! Error types for the battle simulation.

use thiserror::Error;

use crate::unit::Team;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for the battle engine.
///
/// Only [`BattleError::Configuration`] prevents a match from running.
/// Script and decision failures are recovered inside the tick loop, and
/// [`BattleError::BackendUnavailable`] is recovered by the backend selector.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Malformed simulation configuration; surfaced before any tick runs.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The requested backend cannot be loaded or invoked.
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable {
        /// Backend identifier.
        backend: String,
        /// Why it could not be used.
        reason: String,
    },

    /// A behaviour script failed to compile or run.
    #[error("Script failure for {team}: {message}")]
    Script {
        /// Team owning the script.
        team: Team,
        /// Interpreter message.
        message: String,
    },

    /// A script returned something that is not a valid decision.
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    /// Invalid engine state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Replay was written by an incompatible version.
    #[error("Replay version mismatch: expected {expected}, found {found}")]
    ReplayVersion {
        /// Version this build understands.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BattleError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a backend-unavailable error.
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that must reach the caller instead of being recovered.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<bincode::Error> for BattleError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
