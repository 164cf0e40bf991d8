//! # Battle Core
//!
//! Deterministic battle simulation between two scripted teams.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO beyond replay files
//! - No system randomness (critical hits use a seeded RNG)
//! - No floating-point math in the rules (uses fixed-point)
//!
//! This separation enables:
//! - Interchangeable backends that agree bit-for-bit
//! - Headless batch runs
//! - Replay verification
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`terrain`] - Terrain table and grid
//! - [`unit`] - Unit model and capabilities
//! - [`sandbox`] - Rhai decision scripts with an execution budget
//! - [`movement`], [`combat`], [`abilities`] - Resolvers
//! - [`victory`] - Win conditions and the stalemate guard
//! - [`simulation`] - Tick scheduler
//! - [`backend`] - Backend contract and selector
//! - [`replay`] - Replay recording and playback

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod abilities;
pub mod backend;
pub mod combat;
pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod math;
pub mod movement;
pub mod replay;
pub mod report;
pub mod sandbox;
pub mod simulation;
pub mod terrain;
pub mod unit;
pub mod victory;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::{BackendSelector, BattleBackend, ReferenceBackend};
    pub use crate::config::{SandboxLimits, SimulationConfig, TeamConfig, UnitTemplate};
    pub use crate::decision::{AttackTarget, BattleView, Decision, DecisionMaker};
    pub use crate::error::{BattleError, Result};
    pub use crate::events::{BattleEvent, NullObserver, TickObserver, TickRecord};
    pub use crate::math::{Fixed, GridPos};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::report::{BattleReport, MatchOutcome, TeamStats};
    pub use crate::sandbox::ScriptSandbox;
    pub use crate::simulation::{Simulation, SimulationStatus};
    pub use crate::terrain::{Terrain, TerrainGrid};
    pub use crate::unit::{Capabilities, Team, Unit, UnitId, UnitKind, UnitStats};
    pub use crate::victory::{EndReason, Winner};
}
