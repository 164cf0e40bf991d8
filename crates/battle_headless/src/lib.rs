//! Headless battle runner.
//!
//! Library half of the `battle` CLI:
//!
//! - [`scenario`] - scenario files (RON/JSON) and the built-in scenarios
//! - [`strategies`] - named decision scripts
//! - [`engine_config`] - backend choice, turned into a selector once at startup
//! - [`batch`] / [`metrics`] - parallel batch runs and their summaries
//! - [`stream`] - per-tick JSON lines for spectators
//!
//! # Example
//!
//! ```bash
//! battle run skirmish --seed 7 --record skirmish.replay
//! battle replay skirmish.replay --verify
//! ```

pub mod batch;
pub mod engine_config;
pub mod metrics;
pub mod scenario;
pub mod strategies;
pub mod stream;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use engine_config::{BackendKind, EngineConfig};
pub use metrics::{BatchSummary, MatchMetrics};
pub use scenario::{Scenario, ScenarioError};
pub use strategies::Strategy;
pub use stream::{JsonLinesObserver, TickFrame};
