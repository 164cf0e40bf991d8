//! Backend selection for the CLI.
//!
//! The selector is built once at startup from an [`EngineConfig`] and passed
//! to whatever runs matches.

use std::path::Path;

use battle_core::backend::BackendSelector;
use battle_core::error::BattleError;
use battle_native::NativeBackend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::scenario::ScenarioError;

/// Which engine runs matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Interpreted reference engine.
    #[default]
    Reference,
    /// Structure-of-arrays kernel.
    Native,
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preferred backend.
    pub backend: BackendKind,
    /// Use the reference engine if the preferred backend cannot be loaded.
    pub fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Reference,
            fallback: true,
        }
    }
}

impl EngineConfig {
    /// Prefer `backend`.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Load from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = ron::from_str(&contents)?;
        Ok(config)
    }

    /// Build the selector.
    ///
    /// Fails only when the native backend is requested, cannot be loaded and
    /// fallback is disabled.
    pub fn build_selector(&self) -> Result<BackendSelector, BattleError> {
        match self.backend {
            BackendKind::Reference => Ok(BackendSelector::reference()),
            BackendKind::Native => match load_native() {
                Ok(native) => {
                    info!("using native backend");
                    Ok(BackendSelector::with_preferred(Box::new(native)))
                }
                Err(err) if self.fallback => {
                    warn!(error = %err, "native backend unavailable, using reference");
                    Ok(BackendSelector::reference())
                }
                Err(err) => Err(err),
            },
        }
    }
}

/// The kernel, if this build offers it.
///
/// # Errors
///
/// [`BattleError::BackendUnavailable`] without the `native` feature.
pub fn load_native() -> Result<NativeBackend, BattleError> {
    if cfg!(feature = "native") {
        NativeBackend::load()
    } else {
        Err(BattleError::unavailable(
            NativeBackend::ENGINE_ID,
            "built without the `native` feature",
        ))
    }
}
