//! Backend contract and selection.
//!
//! Every engine implements [`BattleBackend`]. The [`BackendSelector`] is
//! built once from configuration and owns the choice: it runs the preferred
//! backend and falls back to the always-available [`ReferenceBackend`] on
//! any failure except a configuration error.

use std::time::Instant;

use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::events::{NullObserver, TickObserver};
use crate::report::BattleReport;
use crate::simulation::Simulation;

/// One battle engine.
pub trait BattleBackend: Send + Sync {
    /// Stable id recorded in reports.
    fn engine_id(&self) -> &'static str;

    /// Run a match to completion, reporting each processed tick.
    ///
    /// # Errors
    ///
    /// [`BattleError::Configuration`](crate::error::BattleError::Configuration)
    /// for malformed configs; anything else means this backend could not
    /// run the match.
    fn run_simulation(
        &self,
        config: &SimulationConfig,
        observer: &mut dyn TickObserver,
    ) -> Result<BattleReport>;
}

/// The interpreted reference engine, driving [`Simulation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceBackend;

impl ReferenceBackend {
    /// Id recorded in reports.
    pub const ENGINE_ID: &'static str = "reference";
}

impl BattleBackend for ReferenceBackend {
    fn engine_id(&self) -> &'static str {
        Self::ENGINE_ID
    }

    fn run_simulation(
        &self,
        config: &SimulationConfig,
        observer: &mut dyn TickObserver,
    ) -> Result<BattleReport> {
        let started = Instant::now();
        let mut sim = Simulation::new(config.clone())?;
        let outcome = sim.run(observer);
        Ok(BattleReport::from_outcome(
            outcome,
            Self::ENGINE_ID,
            elapsed_ms(started),
        ))
    }
}

/// Chooses which backend runs a match.
pub struct BackendSelector {
    preferred: Option<Box<dyn BattleBackend>>,
    reference: ReferenceBackend,
}

impl std::fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSelector")
            .field("preferred", &self.preferred.as_ref().map(|b| b.engine_id()))
            .finish()
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::reference()
    }
}

impl BackendSelector {
    /// Always use the reference backend.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            preferred: None,
            reference: ReferenceBackend,
        }
    }

    /// Try `preferred` first, falling back to the reference backend.
    #[must_use]
    pub fn with_preferred(preferred: Box<dyn BattleBackend>) -> Self {
        Self {
            preferred: Some(preferred),
            reference: ReferenceBackend,
        }
    }

    /// Id of the backend tried first.
    #[must_use]
    pub fn preferred_id(&self) -> &'static str {
        self.preferred
            .as_ref()
            .map_or(ReferenceBackend::ENGINE_ID, |b| b.engine_id())
    }

    /// Run a match without observing ticks.
    ///
    /// # Errors
    ///
    /// Only configuration errors escape.
    pub fn run_simulation(&self, config: &SimulationConfig) -> Result<BattleReport> {
        self.run_with_observer(config, &mut NullObserver)
    }

    /// Run a match, reporting each processed tick.
    ///
    /// A preferred backend that fails before producing a report never
    /// leaves a partial result: the reference backend reruns the match from
    /// scratch. The observer may therefore see ticks from the failed attempt
    /// if the preferred backend failed mid-match.
    ///
    /// # Errors
    ///
    /// Only configuration errors escape.
    pub fn run_with_observer(
        &self,
        config: &SimulationConfig,
        observer: &mut dyn TickObserver,
    ) -> Result<BattleReport> {
        config.validate()?;
        if let Some(preferred) = &self.preferred {
            match preferred.run_simulation(config, observer) {
                Ok(report) => return Ok(report),
                Err(err) if err.is_configuration() => return Err(err),
                Err(err) => warn!(
                    backend = preferred.engine_id(),
                    error = %err,
                    "backend failed, falling back to reference"
                ),
            }
        }
        let report = self.reference.run_simulation(config, observer)?;
        info!(
            engine = %report.engine_id,
            winner = %report.winner,
            ticks = report.total_ticks,
            "match complete"
        );
        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
