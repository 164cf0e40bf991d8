//! Batch match runner for balance testing.
//!
//! Runs one scenario many times in parallel with rayon, seeds `seed_start`,
//! `seed_start + 1`, ..., and aggregates the results.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use battle_core::backend::BackendSelector;
use battle_core::victory::Winner;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, MatchMetrics};
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name, for the record
    pub scenario: String,
    /// Number of matches to run
    pub match_count: u32,
    /// Seed of the first match
    pub seed_start: u64,
    /// Worker threads (0 = rayon default)
    pub parallel: u32,
    /// Tick budget override
    pub max_ticks: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish".to_string(),
            match_count: 100,
            seed_start: 0,
            parallel: 0,
            max_ticks: None,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, match_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            match_count,
            ..Default::default()
        }
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set worker threads
    pub fn with_parallel(mut self, threads: u32) -> Self {
        self.parallel = threads;
        self
    }

    /// Override the tick budget
    pub fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Seed of match `index`
    pub fn seed_for(&self, index: u32) -> u64 {
        self.seed_start.wrapping_add(u64::from(index))
    }
}

/// Results from a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual match metrics, in seed order
    pub matches: Vec<MatchMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("match {match_index} (seed {seed}) failed: {message}")]
pub struct BatchError {
    /// Match index
    pub match_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    total: u32,
    completed: AtomicU32,
    team_a_wins: AtomicU32,
    team_b_wins: AtomicU32,
    start_time: Instant,
}

impl BatchProgress {
    /// Create new progress tracker
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            team_a_wins: AtomicU32::new(0),
            team_b_wins: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed match
    pub fn record_completion(&self, winner: Winner) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match winner {
            Winner::TeamA => {
                self.team_a_wins.fetch_add(1, Ordering::Relaxed);
            }
            Winner::TeamB => {
                self.team_b_wins.fetch_add(1, Ordering::Relaxed);
            }
            Winner::Draw => {}
        }
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_match = self.start_time.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_match * f64::from(remaining))
    }

    /// Win rates so far, `(team A, team B)`
    pub fn current_win_rates(&self) -> (f64, f64) {
        let completed = self.current();
        if completed == 0 {
            return (0.0, 0.0);
        }
        let rate =
            |wins: &AtomicU32| f64::from(wins.load(Ordering::Relaxed)) / f64::from(completed);
        (rate(&self.team_a_wins), rate(&self.team_b_wins))
    }

    fn log(&self) {
        let (a, b) = self.current_win_rates();
        let eta = self.eta();
        info!(
            completed = self.current(),
            total = self.total,
            "batch progress {:.1}%, eta {}m {}s, win rates A {:.1}% / B {:.1}%",
            self.percentage(),
            eta.as_secs() / 60,
            eta.as_secs() % 60,
            a * 100.0,
            b * 100.0,
        );
    }
}

/// Run one match of the batch.
fn run_single_match(
    scenario: &Scenario,
    index: u32,
    config: &BatchConfig,
    selector: &BackendSelector,
) -> Result<MatchMetrics, BatchError> {
    let seed = config.seed_for(index);
    let mut match_config = scenario.config.clone().with_seed(seed);
    if let Some(max_ticks) = config.max_ticks {
        match_config.max_ticks = max_ticks;
    }
    selector
        .run_simulation(&match_config)
        .map(|report| MatchMetrics::from_report(index, &report))
        .map_err(|err| BatchError {
            match_index: index,
            seed,
            message: err.to_string(),
        })
}

/// Run a batch of matches
pub fn run_batch(
    config: BatchConfig,
    scenario: &Scenario,
    selector: &BackendSelector,
) -> BatchResults {
    let start = Instant::now();
    let progress = BatchProgress::new(config.match_count);

    info!(
        "Starting batch run: {} matches of '{}' on {}",
        config.match_count,
        config.scenario,
        selector.preferred_id()
    );

    let run_all = || -> Vec<Result<MatchMetrics, BatchError>> {
        (0..config.match_count)
            .into_par_iter()
            .map(|index| {
                let result = run_single_match(scenario, index, &config, selector);
                match &result {
                    Ok(metrics) => {
                        progress.record_completion(metrics.winner);
                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!("Progress: {}/{}", completed, config.match_count);
                        }
                        if completed % 100 == 0 {
                            progress.log();
                        }
                    }
                    Err(err) => warn!("{}", err),
                }
                result
            })
            .collect()
    };

    let results = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(err) => {
                warn!("Failed to build thread pool: {}, using the global pool", err);
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (matches, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let matches: Vec<MatchMetrics> = matches.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_matches(&matches);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} matches in {:.1}s ({:.1} matches/sec)",
        matches.len(),
        duration_seconds,
        matches.len() as f64 / duration_seconds.max(f64::EPSILON)
    );

    BatchResults {
        config,
        matches,
        summary,
        duration_seconds,
        errors,
    }
}

/// Run the same seed `runs` times and check every run ends identically.
pub fn verify_determinism(
    scenario: &Scenario,
    seed: u64,
    runs: u32,
    selector: &BackendSelector,
) -> Result<bool, BatchError> {
    let config = BatchConfig::new(&scenario.name, 1).with_seed(seed);
    let results = (0..runs)
        .map(|_| run_single_match(scenario, 0, &config, selector))
        .collect::<Result<Vec<_>, _>>()?;

    let Some(first) = results.first() else {
        return Ok(true);
    };
    Ok(results.iter().all(|r| {
        r.winner == first.winner
            && r.total_ticks == first.total_ticks
            && r.end_reason == first.end_reason
            && r.final_hash == first.final_hash
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_duel() -> Scenario {
        let mut scenario = Scenario::duel();
        scenario.config.max_ticks = 60;
        scenario
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.match_count, 100);
        assert_eq!(config.scenario, "skirmish");
        assert_eq!(config.max_ticks, None);
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("siege", 500)
            .with_seed(12345)
            .with_parallel(2)
            .with_max_ticks(40);

        assert_eq!(config.scenario, "siege");
        assert_eq!(config.match_count, 500);
        assert_eq!(config.seed_for(3), 12348);
        assert_eq!(config.parallel, 2);
        assert_eq!(config.max_ticks, Some(40));
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new(100);
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.percentage(), 0.0);

        progress.record_completion(Winner::TeamA);
        progress.record_completion(Winner::TeamB);
        progress.record_completion(Winner::TeamA);

        assert_eq!(progress.current(), 3);
        let (a, b) = progress.current_win_rates();
        assert!((a - 0.666).abs() < 0.01);
        assert!((b - 0.333).abs() < 0.01);
    }

    #[test]
    fn test_run_batch_small() {
        let config = BatchConfig::new("duel", 6).with_seed(10).with_parallel(2);
        let results = run_batch(config, &quick_duel(), &BackendSelector::reference());

        assert_eq!(results.matches.len(), 6);
        assert!(results.errors.is_empty());
        assert_eq!(results.summary.total_matches, 6);
        let seeds: Vec<u64> = results.matches.iter().map(|m| m.seed).collect();
        assert_eq!(seeds, vec![10, 11, 12, 13, 14, 15]);
        assert!(results.matches.iter().all(|m| m.total_ticks <= 60));
    }

    #[test]
    fn test_max_ticks_override() {
        let config = BatchConfig::new("duel", 2).with_max_ticks(3);
        let results = run_batch(config, &quick_duel(), &BackendSelector::reference());
        assert!(results.matches.iter().all(|m| m.total_ticks <= 3));
    }

    #[test]
    fn test_invalid_scenario_is_reported_per_match() {
        let mut scenario = quick_duel();
        scenario.config.team_a.units.clear();
        let results = run_batch(
            BatchConfig::new("broken", 3),
            &scenario,
            &BackendSelector::reference(),
        );
        assert!(results.matches.is_empty());
        assert_eq!(results.errors.len(), 3);
        assert!(results.errors[0].message.contains("roster is empty"));
    }

    #[test]
    fn test_verify_determinism() {
        let selector = BackendSelector::reference();
        assert!(verify_determinism(&Scenario::skirmish(), 7, 3, &selector).unwrap());
    }

    #[test]
    fn test_batch_results_save_load() {
        let config = BatchConfig::new("duel", 3);
        let results = run_batch(config, &quick_duel(), &BackendSelector::reference());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.matches.len(), 3);
        assert_eq!(loaded.config.scenario, "duel");
        assert_eq!(loaded.summary.total_matches, 3);
    }
}
