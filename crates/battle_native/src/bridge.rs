//! Byte-buffer entry point into the kernel.
//!
//! The host encodes a [`BridgeRequest`] with bincode, hands the bytes to
//! [`run_bridge`] and decodes the [`BridgeResponse`] it gets back. Decisions
//! and per-tick notifications travel the other way through [`KernelHost`]
//! callbacks. Nothing crosses the boundary except bytes and those callbacks.

use battle_core::decision::{BattleView, Decision};
use battle_core::error::Result;
use battle_core::events::TickRecord;
use battle_core::unit::{Team, Unit};
use battle_core::victory::{EndReason, Winner};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::layout::KernelConfig;

/// Callbacks the kernel makes into its host.
pub trait KernelHost {
    /// Decide for one unit. Errors idle the unit and count as a script
    /// failure, except [`BattleError::InvalidDecision`](battle_core::error::BattleError::InvalidDecision).
    fn decide(&mut self, team: Team, view: &BattleView<'_>) -> Result<Decision>;

    /// Called after every processed tick.
    fn on_tick(&mut self, record: &TickRecord, units: &[Unit]);
}

/// Input to one kernel match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRequest {
    /// The match.
    pub config: KernelConfig,
    /// Failures already counted by the host (scripts that did not compile).
    pub script_failures: [u32; 2],
}

/// Final kernel state. Unit arrays are in roster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelResult {
    /// Result.
    pub winner: Winner,
    /// Why it ended.
    pub end_reason: EndReason,
    /// Last tick number.
    pub total_ticks: u64,
    /// Final columns.
    pub xs: Vec<i32>,
    /// Final rows.
    pub ys: Vec<i32>,
    /// Final health as raw fixed-point bits.
    pub health: Vec<i64>,
    /// Final cooldowns.
    pub cooldown: Vec<u32>,
    /// Final alive flags.
    pub alive: Vec<bool>,
    /// Every processed tick.
    pub event_log: Vec<TickRecord>,
    /// Script failures per team.
    pub script_failures: [u32; 2],
}

/// What the kernel hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeResponse {
    /// The match ran to completion.
    Finished(KernelResult),
    /// The request could not be run.
    Rejected(String),
}

/// Run one match from an encoded [`BridgeRequest`], returning an encoded
/// [`BridgeResponse`].
pub fn run_bridge(request: &[u8], host: &mut dyn KernelHost) -> Vec<u8> {
    let response = match execute(request, host) {
        Ok(result) => BridgeResponse::Finished(result),
        Err(err) => {
            warn!(error = %err, "kernel rejected request");
            BridgeResponse::Rejected(err.to_string())
        }
    };
    // An empty buffer fails to decode on the host side.
    bincode::serialize(&response).unwrap_or_default()
}

fn execute(
    request: &[u8],
    host: &mut dyn KernelHost,
) -> std::result::Result<KernelResult, KernelError> {
    let request: BridgeRequest = bincode::deserialize(request)?;
    let kernel = Kernel::new(&request.config, request.script_failures)?;
    Ok(kernel.run(host))
}

/// Host-side helper: encode a request.
pub fn encode_request(request: &BridgeRequest) -> std::result::Result<Vec<u8>, KernelError> {
    Ok(bincode::serialize(request)?)
}

/// Host-side helper: decode a response into a result.
pub fn decode_response(bytes: &[u8]) -> std::result::Result<KernelResult, KernelError> {
    match bincode::deserialize(bytes)? {
        BridgeResponse::Finished(result) => Ok(result),
        BridgeResponse::Rejected(reason) => Err(KernelError::Rejected(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::config::{SimulationConfig, TeamConfig, UnitTemplate};
    use battle_core::decision::{DecisionMaker, IdleDecider};
    use battle_core::unit::UnitKind;

    struct Idle(usize);

    impl KernelHost for Idle {
        fn decide(&mut self, _team: Team, view: &BattleView<'_>) -> Result<Decision> {
            IdleDecider.decide(view)
        }

        fn on_tick(&mut self, _record: &TickRecord, _units: &[Unit]) {
            self.0 += 1;
        }
    }

    fn request() -> BridgeRequest {
        let config = SimulationConfig::new(6, 6)
            .with_team(
                Team::A,
                TeamConfig::new(vec![UnitTemplate::new(UnitKind::Tank, 0, 0)], ""),
            )
            .with_team(
                Team::B,
                TeamConfig::new(vec![UnitTemplate::new(UnitKind::Drone, 5, 5)], ""),
            )
            .with_max_ticks(10);
        BridgeRequest {
            config: KernelConfig::from_config(&config).unwrap(),
            script_failures: [0, 0],
        }
    }

    #[test]
    fn test_bridge_runs_encoded_request() {
        let bytes = encode_request(&request()).unwrap();
        let mut host = Idle(0);
        let result = decode_response(&run_bridge(&bytes, &mut host)).unwrap();
        assert_eq!(result.total_ticks, 10);
        assert_eq!(result.end_reason, EndReason::TimeLimit);
        assert_eq!(result.winner, Winner::TeamA);
        assert_eq!(host.0, 9);
        assert_eq!(result.event_log.len(), 9);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let mut host = Idle(0);
        let err = decode_response(&run_bridge(&[1, 2, 3], &mut host)).unwrap_err();
        assert!(matches!(err, KernelError::Rejected(_)));
        assert_eq!(host.0, 0);
    }

    #[test]
    fn test_malformed_layout_is_rejected() {
        let mut req = request();
        req.config.ys.clear();
        let bytes = encode_request(&req).unwrap();
        let err = decode_response(&run_bridge(&bytes, &mut Idle(0))).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
