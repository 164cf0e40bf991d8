//! Headless battle runner.
//!
//! Runs scripted battles without graphics. Results and spectator frames go to
//! stdout as JSON; logs and summaries go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a built-in scenario (or a .ron/.json file) and print the report
//! battle run skirmish --seed 7 --json
//!
//! # Record a replay while running
//! battle run scenarios/siege.ron --record siege.replay
//!
//! # Run 1000 matches with consecutive seeds
//! battle batch skirmish --count 1000 --output results/skirmish.json
//!
//! # Spectator stream, one JSON line per tick, 50ms apart
//! battle stream duel --delay-ms 50
//!
//! # Same seed several times, plus reference/native agreement
//! battle verify siege --seed 3 --runs 5 --parity
//!
//! # Check a replay against a fresh re-simulation
//! battle replay siege.replay --verify
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use battle_core::backend::{BackendSelector, BattleBackend, ReferenceBackend};
use battle_core::error::BattleError;
use battle_core::events::NullObserver;
use battle_core::replay::{Replay, ReplayPlayer};
use battle_core::report::BattleReport;
use battle_core::unit::Team;
use battle_headless::{
    batch::{run_batch, verify_determinism, BatchConfig, BatchError},
    engine_config::{load_native, BackendKind, EngineConfig},
    scenario::{Scenario, ScenarioError, BUILTIN_NAMES},
    strategies::{Strategy, StrategyError},
    stream::JsonLinesObserver,
};

#[derive(Parser)]
#[command(name = "battle")]
#[command(about = "Headless runner for scripted two-team battles")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Preferred backend (overrides the engine config file)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendKind>,

    /// Engine config file (RON)
    #[arg(long, global = true)]
    engine_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that run one match.
#[derive(clap::Args)]
struct MatchArgs {
    /// Built-in scenario name or path to a .ron/.json scenario
    #[arg(default_value = "duel")]
    scenario: String,

    /// Override the scenario's seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the scenario's tick budget
    #[arg(long)]
    max_ticks: Option<u32>,

    /// Replace team A's script with a strategy (name or RON file)
    #[arg(long)]
    strategy_a: Option<String>,

    /// Replace team B's script with a strategy (name or RON file)
    #[arg(long)]
    strategy_b: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single match
    Run {
        #[command(flatten)]
        args: MatchArgs,

        /// Print the full report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Write the full report as JSON to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record a replay file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Run a batch of matches for balance testing
    Batch {
        #[command(flatten)]
        args: MatchArgs,

        /// Number of matches to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Results file
        #[arg(short, long, default_value = "results/batch_results.json")]
        output: PathBuf,
    },

    /// Stream a match as JSON lines, one per tick
    Stream {
        #[command(flatten)]
        args: MatchArgs,

        /// Pause between ticks
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },

    /// Verify determinism by running the same seed multiple times
    Verify {
        #[command(flatten)]
        args: MatchArgs,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Also check the native backend agrees with the reference engine
        #[arg(long)]
        parity: bool,
    },

    /// Play back or verify a recorded replay
    Replay {
        /// Replay file path
        file: PathBuf,

        /// Re-simulate and compare against the recording
        #[arg(long)]
        verify: bool,

        /// Print unit state at this tick as JSON
        #[arg(long)]
        seek: Option<u64>,
    },

    /// List built-in strategies and scenarios
    Strategies {
        /// Print one strategy's script
        #[arg(long)]
        show: Option<String>,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Battle(#[from] BattleError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<(), CliError> {
    if let Commands::Strategies { show } = &cli.command {
        return cmd_strategies(show.as_deref());
    }
    if let Commands::Replay { file, verify, seek } = &cli.command {
        return cmd_replay(file, *verify, *seek);
    }

    let mut engine = match &cli.engine_config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = cli.backend {
        engine = engine.with_backend(backend);
    }
    let selector = engine.build_selector()?;

    match cli.command {
        Commands::Run {
            args,
            json,
            output,
            record,
        } => cmd_run(&selector, &args, json, output.as_deref(), record.as_deref()),
        Commands::Batch {
            args,
            count,
            parallel,
            output,
        } => cmd_batch(&selector, &args, count, parallel, &output),
        Commands::Stream { args, delay_ms } => cmd_stream(&selector, &args, delay_ms),
        Commands::Verify { args, runs, parity } => cmd_verify(&selector, &args, runs, parity),
        Commands::Replay { .. } | Commands::Strategies { .. } => Ok(()),
    }
}

/// Resolve the scenario and apply command-line overrides.
fn load_scenario(args: &MatchArgs) -> Result<Scenario, CliError> {
    let mut scenario = Scenario::resolve(&args.scenario)?;
    if let Some(seed) = args.seed {
        scenario.config.seed = seed;
    }
    if let Some(max_ticks) = args.max_ticks {
        scenario.config.max_ticks = max_ticks;
    }
    for (team, strategy) in [(Team::A, &args.strategy_a), (Team::B, &args.strategy_b)] {
        if let Some(name) = strategy {
            let strategy = Strategy::resolve(name)?;
            tracing::info!(%team, strategy = %strategy.name, "script replaced");
            scenario = scenario.with_strategy(team, &strategy);
        }
    }
    scenario.validate()?;
    Ok(scenario)
}

fn print_summary(scenario: &Scenario, report: &BattleReport) {
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("{} (seed {}, engine {})", scenario.name, report.seed, report.engine_id);
    eprintln!("{}", "=".repeat(50));
    eprintln!("Winner: {}", report.winner);
    eprintln!("End reason: {}", report.end_reason);
    eprintln!("Ticks: {}", report.total_ticks);
    for team in Team::BOTH {
        let stats = report.stats(team);
        eprintln!(
            "  {team}: {} alive, {} lost, {} kills, {:.1} dealt, {:.1} healed, {} script failures",
            stats.units_remaining,
            stats.units_lost,
            stats.kills,
            stats.damage_dealt.to_num::<f64>(),
            stats.healing_done.to_num::<f64>(),
            stats.script_failures,
        );
    }
    eprintln!("Final hash: {:016x}", report.final_hash);
    eprintln!("Duration: {} ms", report.duration_ms);
}

/// Run a single match
fn cmd_run(
    selector: &BackendSelector,
    args: &MatchArgs,
    json: bool,
    output: Option<&Path>,
    record: Option<&Path>,
) -> Result<(), CliError> {
    let scenario = load_scenario(args)?;
    tracing::info!(
        scenario = %scenario.name,
        seed = scenario.config.seed,
        backend = selector.preferred_id(),
        "running match"
    );

    let report = selector.run_simulation(&scenario.config)?;
    print_summary(&scenario, &report);

    if let Some(path) = record {
        Replay::from_report(scenario.config.clone(), &report).save(path)?;
        eprintln!("Replay saved to: {}", path.display());
    }
    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        eprintln!("Report saved to: {}", path.display());
    }
    if json {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

/// Run batch of matches for balance testing
fn cmd_batch(
    selector: &BackendSelector,
    args: &MatchArgs,
    count: u32,
    parallel: u32,
    output: &Path,
) -> Result<(), CliError> {
    let scenario = load_scenario(args)?;
    let mut config = BatchConfig::new(&scenario.name, count)
        .with_seed(args.seed.unwrap_or(0))
        .with_parallel(parallel);
    config.max_ticks = args.max_ticks;

    tracing::info!(
        scenario = %scenario.name,
        count,
        parallel,
        seed = config.seed_start,
        output = %output.display(),
        "Batch configuration"
    );

    let results = run_batch(config, &scenario, selector);
    results.save(output)?;

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Matches played: {}", results.matches.len());
    if !results.errors.is_empty() {
        eprintln!("Matches failed: {}", results.errors.len());
    }
    eprintln!(
        "Win rates: teamA {:.1}%, teamB {:.1}%, draws {:.1}%",
        summary.team_a_win_rate * 100.0,
        summary.team_b_win_rate * 100.0,
        summary.draw_rate * 100.0
    );
    eprintln!(
        "Ticks: avg {:.1}, min {}, max {}",
        summary.avg_ticks, summary.min_ticks, summary.max_ticks
    );
    for (reason, n) in &summary.end_reasons {
        eprintln!("  {reason}: {n}");
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!("Results saved to: {}", output.display());

    if results.matches.is_empty() && !results.errors.is_empty() {
        return Err(CliError::Failed(format!(
            "every match failed, first error: {}",
            results.errors[0]
        )));
    }
    Ok(())
}

/// Stream a match to stdout as JSON lines
fn cmd_stream(
    selector: &BackendSelector,
    args: &MatchArgs,
    delay_ms: u64,
) -> Result<(), CliError> {
    let scenario = load_scenario(args)?;
    let stdout = std::io::stdout();
    let mut observer =
        JsonLinesObserver::new(stdout.lock()).with_delay(Duration::from_millis(delay_ms));

    let report = selector.run_with_observer(&scenario.config, &mut observer)?;
    let frames = observer.frames();
    observer.finish()?;
    tracing::info!(
        frames,
        winner = %report.winner,
        ticks = report.total_ticks,
        "stream finished"
    );
    Ok(())
}

/// Verify determinism by running same seed multiple times
fn cmd_verify(
    selector: &BackendSelector,
    args: &MatchArgs,
    runs: u32,
    parity: bool,
) -> Result<(), CliError> {
    let scenario = load_scenario(args)?;
    let seed = scenario.config.seed;
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    if !verify_determinism(&scenario, seed, runs, selector)? {
        return Err(CliError::Failed("non-determinism detected".to_string()));
    }
    eprintln!("PASS: All {runs} runs produced identical results");

    if parity {
        let reference = ReferenceBackend.run_simulation(&scenario.config, &mut NullObserver)?;
        let native = load_native()?.run_simulation(&scenario.config, &mut NullObserver)?;
        if !native.same_outcome(&reference) || native.final_hash != reference.final_hash {
            for report in [&reference, &native] {
                eprintln!(
                    "  {:<9} {} after {} ticks, hash {:016x}",
                    report.engine_id, report.winner, report.total_ticks, report.final_hash
                );
            }
            return Err(CliError::Failed("backends disagree".to_string()));
        }
        eprintln!("PASS: reference and native backends agree");
    }
    Ok(())
}

/// Replay a recorded match
fn cmd_replay(file: &Path, verify: bool, seek: Option<u64>) -> Result<(), CliError> {
    let replay = Replay::load(file)?;

    eprintln!("Loaded replay:");
    eprintln!("  Engine: {}", replay.engine_id);
    eprintln!("  Seed: {}", replay.config.seed);
    eprintln!("  Events: {}", replay.event_count());
    eprintln!("  Duration: {} ticks", replay.duration());
    eprintln!("  Result: {} ({})", replay.winner, replay.end_reason);

    if verify {
        eprintln!("Verifying replay...");
        let verification = replay.verify()?;
        if !verification.is_match() {
            eprintln!("  Expected hash: {:016x}", verification.expected_hash);
            eprintln!("  Actual hash:   {:016x}", verification.actual_hash);
            if let Some(tick) = verification.first_divergence {
                eprintln!("  First divergence at tick {tick}");
            }
            return Err(CliError::Failed("replay does not match re-simulation".to_string()));
        }
        eprintln!("PASS: Re-simulation matches the recording");
        eprintln!("  Hash: {:016x}", verification.actual_hash);
    }

    let mut player = ReplayPlayer::new(replay)?;
    match seek {
        Some(tick) => {
            player.seek(tick);
            eprintln!("State at tick {}:", player.current_tick());
            println!("{}", serde_json::to_string(player.units())?);
        }
        None => {
            let mut last_percent = 0;
            while player.advance().is_some() {
                let percent = player.progress_percent() as u32;
                if percent >= last_percent + 10 {
                    last_percent = percent - percent % 10;
                    eprintln!("  {last_percent}%");
                }
            }
            if !player.verify() {
                return Err(CliError::Failed(
                    "event playback does not reach the recorded final state".to_string(),
                ));
            }
            eprintln!("Playback complete at tick {}", player.current_tick());
        }
    }
    Ok(())
}

/// List strategies and scenarios
fn cmd_strategies(show: Option<&str>) -> Result<(), CliError> {
    if let Some(name) = show {
        let strategy = Strategy::resolve(name)?;
        println!("{}", strategy.script.trim());
        return Ok(());
    }
    eprintln!("Strategies:");
    for strategy in Strategy::builtins() {
        eprintln!("  {:<10} {}", strategy.name, strategy.description);
    }
    eprintln!("Scenarios:");
    for name in BUILTIN_NAMES {
        if let Some(scenario) = Scenario::builtin(name) {
            eprintln!("  {:<10} {}", scenario.name, scenario.description);
        }
    }
    Ok(())
}
