//! Tick scheduler and match state machine.
//!
//! A [`Simulation`] owns one match exclusively. Each tick runs in a fixed
//! order:
//!
//! 1. **Terminal checks** - elimination, tick budget, stalemate guard
//! 2. **Snapshot** - unit state at tick start, read by every decision
//! 3. **Unit turns** - team A roster order, then team B; healers heal,
//!    everyone else asks their team's [`DecisionMaker`] and resolves the move
//!    or attack against live state
//! 4. **Cooldowns** - every unit counts down by one
//!
//! # Determinism
//!
//! - Stats and damage are fixed-point
//! - Critical hits draw from a `ChaCha8Rng` seeded from the config
//! - Iteration order is roster order, never hash order
//!
//! # Example
//!
//! ```
//! use battle_core::config::{SimulationConfig, TeamConfig, UnitTemplate};
//! use battle_core::events::NullObserver;
//! use battle_core::simulation::Simulation;
//! use battle_core::unit::{Team, UnitKind};
//!
//! let script = r#"
//!     let me = state.unit;
//!     let foe = state.enemies[0];
//!     if distance(me.x, me.y, foe.x, foe.y) <= me.range {
//!         return #{ action: "attack", target_id: foe.id };
//!     }
//!     #{ action: "move", target: foe.position }
//! "#;
//! let config = SimulationConfig::new(10, 10)
//!     .with_team(Team::A, TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, 0, 0)], script))
//!     .with_team(Team::B, TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, 7, 0)], script));
//!
//! let mut sim = Simulation::new(config).unwrap();
//! let outcome = sim.run(&mut NullObserver);
//! assert_eq!(outcome.winner.id(), "teamA");
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::abilities::resolve_heal;
use crate::combat::resolve_attack;
use crate::config::SimulationConfig;
use crate::decision::{BattleView, Decision, DecisionMaker};
use crate::error::{BattleError, Result};
use crate::events::{TickObserver, TickRecord};
use crate::movement::resolve_move;
use crate::report::{units_hash, MatchOutcome};
use crate::sandbox::ScriptSandbox;
use crate::unit::{Team, Unit};
use crate::victory::{
    alive_counts, check_elimination, health_totals, stalemate_winner, time_limit_winner,
    EndReason, StalemateGuard, Winner,
};

/// Lifecycle of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationStatus {
    /// Units built, scripts not compiled yet.
    Created,
    /// Ready to tick.
    Initialized,
    /// At least one tick processed.
    Running,
    /// Terminal; further ticks are no-ops.
    Finished,
}

/// The reference battle engine.
pub struct Simulation {
    config: SimulationConfig,
    tick: u64,
    units: Vec<Unit>,
    status: SimulationStatus,
    result: Option<(Winner, EndReason)>,
    deciders: Option<[Box<dyn DecisionMaker>; 2]>,
    rng: ChaCha8Rng,
    stalemate: StalemateGuard,
    history: Vec<TickRecord>,
    script_failures: [u32; 2],
    logs: Vec<String>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("status", &self.status)
            .field("result", &self.result)
            .field("units", &self.units.len())
            .field("script_failures", &self.script_failures)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Validate the config and build units from both rosters.
    ///
    /// Scripts are compiled by [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::Configuration`] if the config is malformed.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let units = config.build_units();
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            tick: 0,
            units,
            status: SimulationStatus::Created,
            result: None,
            deciders: None,
            rng,
            stalemate: StalemateGuard::new(),
            history: Vec::new(),
            script_failures: [0; 2],
            logs: Vec::new(),
        })
    }

    /// Like [`new`](Self::new), but with native decision makers in place of
    /// the configured scripts. The result is already initialized.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::Configuration`] if the config is malformed.
    pub fn with_decision_makers(
        config: SimulationConfig,
        team_a: Box<dyn DecisionMaker>,
        team_b: Box<dyn DecisionMaker>,
    ) -> Result<Self> {
        let mut sim = Self::new(config)?;
        sim.deciders = Some([team_a, team_b]);
        sim.status = SimulationStatus::Initialized;
        sim.log("initialized with native decision makers".to_string());
        Ok(sim)
    }

    /// Compile both team scripts. A script that fails to compile idles its
    /// team for the whole match. No-op unless the status is `Created`.
    pub fn initialize(&mut self) {
        if self.status != SimulationStatus::Created {
            return;
        }
        let mut compile = |team: Team| -> Box<dyn DecisionMaker> {
            let sandbox = ScriptSandbox::compile(
                team,
                &self.config.team(team).script,
                &self.config.limits,
                &self.config.terrain,
                self.config.grid_width,
                self.config.grid_height,
            );
            if let Some(error) = sandbox.compile_error() {
                self.script_failures[team.index()] += 1;
                self.logs.push(format!("{team} script failed to compile: {error}"));
            }
            Box::new(sandbox)
        };
        let team_a = compile(Team::A);
        let team_b = compile(Team::B);
        self.deciders = Some([team_a, team_b]);
        self.status = SimulationStatus::Initialized;

        info!(
            units = self.units.len(),
            max_ticks = self.config.max_ticks,
            seed = self.config.seed,
            "match initialized"
        );
        self.log(format!("initialized with {} units", self.units.len()));
    }

    /// Advance the match by one tick.
    ///
    /// Returns the tick's record, or `None` if nothing was processed: the
    /// match is not initialized, already finished, or finished on this tick.
    pub fn tick(&mut self) -> Option<TickRecord> {
        match self.status {
            SimulationStatus::Created | SimulationStatus::Finished => return None,
            SimulationStatus::Initialized => self.status = SimulationStatus::Running,
            SimulationStatus::Running => {}
        }
        self.tick += 1;

        let alive = alive_counts(&self.units);
        if let Some(winner) = check_elimination(alive) {
            self.finish(winner, EndReason::Elimination);
            return None;
        }
        let health = health_totals(&self.units);
        if self.tick >= u64::from(self.config.max_ticks) {
            self.finish(time_limit_winner(health), EndReason::TimeLimit);
            return None;
        }
        if self.stalemate.observe(health[0].saturating_add(health[1])) {
            self.finish(stalemate_winner(alive), EndReason::Stalemate);
            return None;
        }

        let record = self.run_unit_turns();
        for unit in &mut self.units {
            unit.tick_cooldown();
        }

        #[cfg(feature = "debug-validation")]
        debug!(tick = self.tick, state_hash = self.state_hash(), "tick complete");

        self.history.push(record.clone());
        Some(record)
    }

    /// Process every unit alive at tick start, in roster order.
    fn run_unit_turns(&mut self) -> TickRecord {
        let mut record = TickRecord::new(self.tick);
        let snapshot = self.units.clone();
        let (width, height) = (self.config.grid_width, self.config.grid_height);

        for index in 0..snapshot.len() {
            // Killed earlier this tick, or never alive.
            if !snapshot[index].alive || !self.units[index].alive {
                continue;
            }
            if self.units[index].cooldown > 0 {
                continue;
            }

            if self.units[index].capabilities.heal.is_some() {
                record.events.extend(resolve_heal(&mut self.units, index));
                continue;
            }

            let actor = &snapshot[index];
            let view = BattleView::observe(
                &snapshot,
                actor,
                &self.config.terrain,
                self.tick,
                width,
                height,
            );
            let decision = match self.deciders.as_mut() {
                Some(deciders) => decide(
                    deciders[actor.team.index()].as_mut(),
                    &view,
                    actor.team,
                    &mut self.script_failures[actor.team.index()],
                ),
                None => Decision::Idle,
            };

            let event = match decision {
                Decision::Idle => None,
                Decision::Move(target) => resolve_move(
                    &mut self.units,
                    index,
                    target,
                    &self.config.terrain,
                    width,
                    height,
                ),
                Decision::Attack(target) => resolve_attack(
                    &mut self.units,
                    index,
                    target,
                    &self.config.terrain,
                    &mut self.rng,
                ),
            };
            record.events.extend(event);
        }
        record
    }

    fn finish(&mut self, winner: Winner, reason: EndReason) {
        self.status = SimulationStatus::Finished;
        self.result = Some((winner, reason));
        info!(
            tick = self.tick,
            %winner,
            %reason,
            script_failures = ?self.script_failures,
            "match finished"
        );
        self.log(format!("finished on tick {}: {winner} by {reason}", self.tick));
    }

    fn log(&mut self, line: String) {
        self.logs.push(line);
    }

    /// Initialize if needed and tick until the match finishes, reporting
    /// each processed tick to `observer`.
    pub fn run(&mut self, observer: &mut dyn TickObserver) -> MatchOutcome {
        self.initialize();
        loop {
            if let Some((winner, reason)) = self.result {
                return self.build_outcome(winner, reason);
            }
            if let Some(record) = self.tick() {
                observer.on_tick(&record, &self.units);
            }
        }
    }

    /// Final outcome, once finished.
    #[must_use]
    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.result
            .map(|(winner, reason)| self.build_outcome(winner, reason))
    }

    fn build_outcome(&self, winner: Winner, end_reason: EndReason) -> MatchOutcome {
        MatchOutcome {
            winner,
            end_reason,
            total_ticks: self.tick,
            units: self.units.clone(),
            event_log: self.history.clone(),
            script_failures: self.script_failures,
            seed: self.config.seed,
        }
    }

    /// Current tick number; 0 before the first tick.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> SimulationStatus {
        self.status
    }

    /// True once terminal.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == SimulationStatus::Finished
    }

    /// Winner, once finished.
    #[must_use]
    pub fn winner(&self) -> Option<Winner> {
        self.result.map(|(winner, _)| winner)
    }

    /// End reason, once finished.
    #[must_use]
    pub fn end_reason(&self) -> Option<EndReason> {
        self.result.map(|(_, reason)| reason)
    }

    /// All units, roster order.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// The config this match was built from.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Records of every processed tick.
    #[must_use]
    pub fn history(&self) -> &[TickRecord] {
        &self.history
    }

    /// Script failures per team, `[team A, team B]`.
    #[must_use]
    pub const fn script_failures(&self) -> [u32; 2] {
        self.script_failures
    }

    /// Lifecycle log lines.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Hash of the observable unit state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        units_hash(&self.units)
    }

    /// Serialize the current unit state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.units)
            .map_err(|e| BattleError::Serialization(format!("failed to serialize units: {e}")))
    }
}

/// Ask a decision maker for one unit, substituting `Idle` on failure.
fn decide(
    decider: &mut dyn DecisionMaker,
    view: &BattleView<'_>,
    team: Team,
    failures: &mut u32,
) -> Decision {
    match decider.decide(view) {
        Ok(decision) => decision,
        Err(BattleError::InvalidDecision(reason)) => {
            debug!(%team, unit = view.unit.id, %reason, "invalid decision, idling");
            Decision::Idle
        }
        Err(err) => {
            *failures += 1;
            if *failures == 1 {
                warn!(%team, unit = view.unit.id, error = %err, "script failed, idling");
            } else {
                debug!(%team, unit = view.unit.id, error = %err, "script failed, idling");
            }
            Decision::Idle
        }
    }
}
