//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a battle produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Both backends must agree bit-for-bit and a replay must re-simulate to the
//! same log. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   Stats and damage use [`battle_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Units are always processed in roster order.
//!
//! - **System randomness**: Critical hits draw from a `ChaCha8Rng` seeded
//!   from the config, never from the OS.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual resolvers (movement, combat, heal)
//! 2. **Property tests**: Random configs must still produce deterministic outputs
//! 3. **Integration tests**: Full scenarios are reproducible
//! 4. **Parallel tests**: Running N matches in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use battle_core::config::SimulationConfig;
use battle_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Final hash from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated in the first run.
    pub ticks: u64,
    /// First tick at which some run's state hash differed from the first
    /// run's.
    pub first_divergence: Option<u64>,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 First divergence: {:?}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                self.first_divergence,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stepped process several times and compare the hash after every
/// step.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Maximum number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Advance by one step; returns false once there is nothing left
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use battle_test_utils::determinism::verify_determinism;
/// use battle_test_utils::fixtures::duel_config;
/// use battle_core::simulation::Simulation;
///
/// let result = verify_determinism(
///     3,
///     100,
///     || {
///         let mut sim = Simulation::new(duel_config()).unwrap();
///         sim.initialize();
///         sim
///     },
///     |sim| {
///         sim.tick();
///         !sim.is_finished()
///     },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S) -> bool,
    HashFn: Fn(&S) -> u64,
{
    let mut traces: Vec<Vec<u64>> = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        let mut trace = vec![hash(&state)];

        for _ in 0..ticks {
            let more = step(&mut state);
            trace.push(hash(&state));
            if !more {
                break;
            }
        }

        traces.push(trace);
    }

    let first_divergence = traces.first().and_then(|reference| {
        traces
            .iter()
            .skip(1)
            .filter_map(|trace| first_difference(reference, trace))
            .min()
    });
    let hashes: Vec<u64> = traces
        .iter()
        .map(|trace| trace.last().copied().unwrap_or_default())
        .collect();
    let ticks = traces
        .first()
        .map_or(0, |trace| trace.len().saturating_sub(1) as u64);

    DeterminismResult {
        is_deterministic: first_divergence.is_none(),
        hashes,
        ticks,
        first_divergence,
    }
}

fn first_difference(a: &[u64], b: &[u64]) -> Option<u64> {
    let mismatch = a.iter().zip(b).position(|(x, y)| x != y);
    let index = match mismatch {
        Some(i) => Some(i),
        None if a.len() != b.len() => Some(a.len().min(b.len())),
        None => None,
    };
    index.map(|i| i as u64)
}

fn initialized(config: &SimulationConfig) -> Simulation {
    let mut sim = match Simulation::new(config.clone()) {
        Ok(sim) => sim,
        Err(err) => panic!("fixture config is invalid: {err}"),
    };
    sim.initialize();
    sim
}

/// Run a config to completion `runs` times, hashing unit state every tick.
///
/// # Panics
///
/// Panics if the config is invalid.
#[must_use]
pub fn verify_simulation_determinism(config: &SimulationConfig, runs: usize) -> DeterminismResult {
    verify_determinism(
        runs,
        u64::from(config.max_ticks),
        || initialized(config),
        |sim| {
            sim.tick();
            !sim.is_finished()
        },
        Simulation::state_hash,
    )
}

/// Run N matches of the same config on separate threads and collect final
/// hashes.
///
/// # Panics
///
/// Panics if the config is invalid or a thread panics.
#[must_use]
pub fn run_parallel_simulations(config: &SimulationConfig, num_sims: usize) -> ParallelSimResult {
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = initialized(config);
                    while !sim.is_finished() {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(hash) => hash,
                Err(_) => panic!("simulation thread panicked"),
            })
            .collect()
    });

    ParallelSimResult { hashes, num_sims }
}

/// Step two matches of the same config side by side and return the first
/// tick at which their state hashes differ.
///
/// # Panics
///
/// Panics if the config is invalid.
#[must_use]
pub fn find_first_divergence(config: &SimulationConfig) -> Option<u64> {
    let mut sim1 = initialized(config);
    let mut sim2 = initialized(config);

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    while !sim1.is_finished() || !sim2.is_finished() {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() || sim1.get_tick() != sim2.get_tick() {
            return Some(sim1.get_tick().max(sim2.get_tick()));
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but valid battle configs for
/// property-based testing.
pub mod strategies {
    use battle_core::config::{SimulationConfig, TeamConfig, UnitTemplate};
    use battle_core::terrain::{Terrain, TerrainGrid};
    use battle_core::unit::{Team, UnitKind};
    use proptest::prelude::*;
    use proptest::sample::{select, subsequence};

    use crate::fixtures::scripts;

    /// Any unit kind.
    pub fn arb_unit_kind() -> impl Strategy<Value = UnitKind> {
        select(UnitKind::ALL.to_vec())
    }

    /// Any terrain.
    pub fn arb_terrain() -> impl Strategy<Value = Terrain> {
        select(Terrain::ALL.to_vec())
    }

    /// A deterministic canned script.
    pub fn arb_script() -> impl Strategy<Value = &'static str> {
        select(vec![
            scripts::CHASE,
            scripts::HOLD,
            scripts::ADVANCE,
            scripts::IDLE,
        ])
    }

    /// A valid config: 4-12 cells a side, 1-4 units per team on distinct
    /// cells, random terrain, canned scripts.
    pub fn arb_config() -> impl Strategy<Value = SimulationConfig> {
        (4u32..12, 4u32..12, 1usize..=4, 1usize..=4)
            .prop_flat_map(|(width, height, a, b)| {
                let cells: Vec<u32> = (0..width * height).collect();
                (
                    Just((width, height, a)),
                    subsequence(cells, a + b),
                    proptest::collection::vec(arb_unit_kind(), a + b),
                    proptest::collection::vec(
                        proptest::collection::vec(arb_terrain(), width as usize),
                        height as usize,
                    ),
                    (arb_script(), arb_script()),
                    (20u32..200, any::<u64>()),
                )
            })
            .prop_map(
                |((width, height, a), cells, kinds, rows, (script_a, script_b), (max_ticks, seed))| {
                    let mut templates = cells.iter().zip(&kinds).map(|(&cell, &kind)| {
                        let x = i32::try_from(cell % width).unwrap_or(0);
                        let y = i32::try_from(cell / width).unwrap_or(0);
                        UnitTemplate::new(kind, x, y)
                    });
                    let team_a: Vec<UnitTemplate> = templates.by_ref().take(a).collect();
                    let team_b: Vec<UnitTemplate> = templates.collect();
                    SimulationConfig::new(width, height)
                        .with_terrain(TerrainGrid::from_rows(rows))
                        .with_team(Team::A, TeamConfig::new(team_a, script_a))
                        .with_team(Team::B, TeamConfig::new(team_b, script_b))
                        .with_max_ticks(max_ticks)
                        .with_seed(seed)
                },
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_config, skirmish_config};
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0u64, |n| {
            *n += 1;
            true
        }, |n| *n);
        result.assert_deterministic();
        assert_eq!(result.ticks, 10);
        assert_eq!(result.hashes, vec![10, 10, 10]);
    }

    #[test]
    fn test_divergence_is_located() {
        use std::cell::Cell;
        let run = Cell::new(0u64);
        let result = verify_determinism(
            2,
            10,
            || {
                run.set(run.get() + 1);
                (0u64, run.get())
            },
            |(n, id)| {
                *n += if *id == 2 && *n >= 4 { 2 } else { 1 };
                true
            },
            |(n, _)| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.first_divergence, Some(5));
    }

    #[test]
    fn test_duel_determinism() {
        let result = verify_simulation_determinism(&duel_config(), 3);
        result.assert_deterministic();
        assert_eq!(result.ticks, 17);
    }

    #[test]
    fn test_skirmish_with_crits_is_deterministic() {
        verify_simulation_determinism(&skirmish_config(9), 3).assert_deterministic();
        assert_eq!(find_first_divergence(&skirmish_config(9)), None);
    }

    #[test]
    fn test_parallel_skirmishes() {
        run_parallel_simulations(&skirmish_config(3), 4).assert_deterministic();
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_generated_configs_are_valid(config in strategies::arb_config()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_repeated_runs_agree(config in strategies::arb_config()) {
            prop_assert_eq!(find_first_divergence(&config), None);
        }
    }
}
