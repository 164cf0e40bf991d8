//! Replay recording, playback and verification.
//!
//! A replay stores the match config (which includes the RNG seed) and every
//! processed tick's events. Unit state at any tick is rebuilt from the
//! config's initial roster plus events alone; re-simulating the config must
//! reproduce the same log.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::SimulationConfig;
use crate::error::{BattleError, Result};
use crate::events::{NullObserver, TickRecord};
use crate::report::{units_hash, BattleReport};
use crate::simulation::Simulation;
use crate::unit::Unit;
use crate::victory::{EndReason, Winner};

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Backend that recorded the match.
    pub engine_id: String,
    /// Match config, including seed.
    pub config: SimulationConfig,
    /// Processed ticks in order.
    pub ticks: Vec<TickRecord>,
    /// Last tick number of the match.
    pub final_tick: u64,
    /// Hash of the final unit state.
    pub final_hash: u64,
    /// Recorded result.
    pub winner: Winner,
    /// Recorded end reason.
    pub end_reason: EndReason,
}

/// Result of re-simulating a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayVerification {
    /// Hash stored in the replay.
    pub expected_hash: u64,
    /// Hash after re-simulating.
    pub actual_hash: u64,
    /// First tick whose events differ, if any.
    pub first_divergence: Option<u64>,
}

impl ReplayVerification {
    /// True if the re-simulation matched exactly.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.first_divergence.is_none() && self.expected_hash == self.actual_hash
    }
}

impl Replay {
    /// Build a replay from a finished match's report.
    #[must_use]
    pub fn from_report(config: SimulationConfig, report: &BattleReport) -> Self {
        Self {
            version: REPLAY_VERSION,
            engine_id: report.engine_id.clone(),
            config,
            ticks: report.event_log.clone(),
            final_tick: report.total_ticks,
            final_hash: report.final_hash,
            winner: report.winner,
            end_reason: report.end_reason,
        }
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| BattleError::Serialization(format!("failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// file was written by another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let replay: Self = bincode::deserialize(&bytes).map_err(|e| {
            BattleError::Serialization(format!("failed to deserialize replay: {e}"))
        })?;

        if replay.version != REPLAY_VERSION {
            return Err(BattleError::ReplayVersion {
                expected: REPLAY_VERSION,
                found: replay.version,
            });
        }

        Ok(replay)
    }

    /// Events recorded for a specific tick.
    #[must_use]
    pub fn tick_at(&self, tick: u64) -> Option<&TickRecord> {
        self.ticks.iter().find(|record| record.tick == tick)
    }

    /// Total duration in ticks.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.final_tick
    }

    /// Total number of events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.ticks.iter().map(|r| r.events.len()).sum()
    }

    /// Re-run the config on the reference engine and compare.
    ///
    /// # Errors
    /// Returns [`BattleError::Configuration`] if the stored config is invalid.
    pub fn verify(&self) -> Result<ReplayVerification> {
        let mut sim = Simulation::new(self.config.clone())?;
        let outcome = sim.run(&mut NullObserver);

        let first_divergence = self
            .ticks
            .iter()
            .zip(&outcome.event_log)
            .find(|(recorded, replayed)| recorded != replayed)
            .map(|(recorded, _)| recorded.tick)
            .or_else(|| {
                (self.ticks.len() != outcome.event_log.len()).then(|| {
                    let shorter = self.ticks.len().min(outcome.event_log.len());
                    u64::try_from(shorter).map_or(u64::MAX, |n| n + 1)
                })
            });

        Ok(ReplayVerification {
            expected_hash: self.final_hash,
            actual_hash: units_hash(&outcome.units),
            first_divergence,
        })
    }
}

/// Rebuilds unit state tick by tick from a replay's events.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    initial: Vec<Unit>,
    units: Vec<Unit>,
    /// Index of the next record to apply.
    cursor: usize,
    current_tick: u64,
}

impl ReplayPlayer {
    /// Create a player positioned before the first tick.
    ///
    /// # Errors
    /// Returns an error if the stored config is invalid.
    pub fn new(replay: Replay) -> Result<Self> {
        replay.config.validate()?;
        let initial = replay.config.build_units();
        Ok(Self {
            units: initial.clone(),
            initial,
            replay,
            cursor: 0,
            current_tick: 0,
        })
    }

    /// Apply the next recorded tick. Returns it, or `None` at the end.
    pub fn advance(&mut self) -> Option<&TickRecord> {
        let record = self.replay.ticks.get(self.cursor)?;
        for event in &record.events {
            event.apply(&mut self.units);
        }
        self.current_tick = record.tick;
        self.cursor += 1;
        Some(record)
    }

    /// Rebuild state as of the end of `target_tick`.
    pub fn seek(&mut self, target_tick: u64) {
        self.units.clone_from(&self.initial);
        self.cursor = 0;
        self.current_tick = 0;
        while self
            .replay
            .ticks
            .get(self.cursor)
            .is_some_and(|record| record.tick <= target_tick)
        {
            self.advance();
        }
    }

    /// Tick of the last applied record; 0 before the first.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Unit state at the current tick.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// The replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// True once every recorded tick has been applied.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.replay.ticks.len()
    }

    /// Hash of the current unit state.
    #[must_use]
    pub fn current_hash(&self) -> u64 {
        units_hash(&self.units)
    }

    /// Play to the end and compare against the stored final hash.
    pub fn verify(&mut self) -> bool {
        self.seek(self.replay.final_tick);
        self.current_hash() == self.replay.final_hash
    }

    /// Get progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.replay.final_tick == 0 {
            100.0
        } else {
            (self.current_tick as f64 / self.replay.final_tick as f64) * 100.0
        }
    }
}
