//! [`BattleBackend`] implementation over the kernel bridge.

use battle_core::backend::BattleBackend;
use battle_core::config::SimulationConfig;
use battle_core::error::{BattleError, Result};
use battle_core::events::TickObserver;
use battle_core::report::BattleReport;

/// The accelerated engine.
///
/// Scripts still run host-side in the Rhai sandbox; the kernel calls back
/// for each decision.
#[derive(Debug, Clone, Copy)]
pub struct NativeBackend {
    _loaded: (),
}

impl NativeBackend {
    /// Id recorded in reports.
    pub const ENGINE_ID: &'static str = "native";

    /// Load the kernel.
    ///
    /// # Errors
    ///
    /// [`BattleError::BackendUnavailable`] when built without the `kernel`
    /// feature.
    pub fn load() -> Result<Self> {
        if cfg!(feature = "kernel") {
            Ok(Self { _loaded: () })
        } else {
            Err(BattleError::unavailable(
                Self::ENGINE_ID,
                "built without the `kernel` feature",
            ))
        }
    }
}

impl BattleBackend for NativeBackend {
    fn engine_id(&self) -> &'static str {
        Self::ENGINE_ID
    }

    #[cfg(feature = "kernel")]
    fn run_simulation(
        &self,
        config: &SimulationConfig,
        observer: &mut dyn TickObserver,
    ) -> Result<BattleReport> {
        kernel_backend::run(config, observer)
    }

    #[cfg(not(feature = "kernel"))]
    fn run_simulation(
        &self,
        _config: &SimulationConfig,
        _observer: &mut dyn TickObserver,
    ) -> Result<BattleReport> {
        Err(BattleError::unavailable(
            Self::ENGINE_ID,
            "built without the `kernel` feature",
        ))
    }
}

#[cfg(feature = "kernel")]
mod kernel_backend {
    use std::time::Instant;

    use battle_core::config::SimulationConfig;
    use battle_core::decision::{BattleView, Decision, DecisionMaker};
    use battle_core::error::Result;
    use battle_core::events::{TickObserver, TickRecord};
    use battle_core::math::{Fixed, GridPos};
    use battle_core::report::{BattleReport, MatchOutcome};
    use battle_core::sandbox::ScriptSandbox;
    use battle_core::unit::{Team, Unit};
    use tracing::{debug, warn};

    use super::NativeBackend;
    use crate::bridge::{
        decode_response, encode_request, run_bridge, BridgeRequest, KernelHost, KernelResult,
    };
    use crate::error::KernelError;
    use crate::layout::KernelConfig;

    /// Scripts and observer on the host side of the bridge.
    struct ScriptHost<'o> {
        deciders: [ScriptSandbox; 2],
        observer: &'o mut dyn TickObserver,
    }

    impl KernelHost for ScriptHost<'_> {
        fn decide(&mut self, team: Team, view: &BattleView<'_>) -> Result<Decision> {
            self.deciders[team.index()].decide(view)
        }

        fn on_tick(&mut self, record: &TickRecord, units: &[Unit]) {
            self.observer.on_tick(record, units);
        }
    }

    pub(super) fn run(
        config: &SimulationConfig,
        observer: &mut dyn TickObserver,
    ) -> Result<BattleReport> {
        let started = Instant::now();
        config.validate()?;
        let layout = KernelConfig::from_config(config)?;

        let mut script_failures = [0u32; 2];
        let deciders = Team::BOTH.map(|team| {
            let sandbox = ScriptSandbox::compile(
                team,
                &config.team(team).script,
                &config.limits,
                &config.terrain,
                config.grid_width,
                config.grid_height,
            );
            if let Some(error) = sandbox.compile_error() {
                script_failures[team.index()] += 1;
                warn!(%team, %error, "script failed to compile, team will idle");
            }
            sandbox
        });

        let request = encode_request(&BridgeRequest {
            config: layout,
            script_failures,
        })?;
        let mut host = ScriptHost { deciders, observer };
        let response = run_bridge(&request, &mut host);
        let result = decode_response(&response)?;
        debug!(bytes_in = request.len(), bytes_out = response.len(), "bridge round trip");

        let outcome = into_outcome(config, result)?;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(BattleReport::from_outcome(
            outcome,
            NativeBackend::ENGINE_ID,
            elapsed,
        ))
    }

    /// Overlay the kernel's final state on freshly built units.
    pub(super) fn into_outcome(
        config: &SimulationConfig,
        result: KernelResult,
    ) -> std::result::Result<MatchOutcome, KernelError> {
        let mut units = config.build_units();
        let count = units.len();
        if [
            result.xs.len(),
            result.ys.len(),
            result.health.len(),
            result.cooldown.len(),
            result.alive.len(),
        ]
        .iter()
        .any(|&len| len != count)
        {
            return Err(KernelError::Layout(format!(
                "kernel returned state for a different roster (expected {count} units)"
            )));
        }
        for (i, unit) in units.iter_mut().enumerate() {
            unit.position = GridPos::new(result.xs[i], result.ys[i]);
            unit.health.current = Fixed::from_bits(result.health[i]);
            unit.cooldown = result.cooldown[i];
            unit.alive = result.alive[i];
        }
        Ok(MatchOutcome {
            winner: result.winner,
            end_reason: result.end_reason,
            total_ticks: result.total_ticks,
            units,
            event_log: result.event_log,
            script_failures: result.script_failures,
            seed: config.seed,
        })
    }
}
