//! Scenario, strategy, replay and batch files on disk.

use std::io::Write;

use battle_core::backend::BackendSelector;
use battle_core::replay::{Replay, ReplayPlayer};
use battle_core::unit::Team;
use battle_headless::batch::{run_batch, BatchConfig, BatchResults};
use battle_headless::engine_config::{BackendKind, EngineConfig};
use battle_headless::scenario::{Scenario, ScenarioError};
use battle_headless::strategies::Strategy;
use battle_headless::stream::JsonLinesObserver;
use battle_test_utils::fixtures::{broken_script_config, skirmish_config};

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_load_ron_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "standoff.ron",
        r#"
        Scenario(
            name: "standoff",
            description: "two archers on a hill",
            config: (
                grid_width: 8,
                grid_height: 3,
                terrain: [["ground", "mountain"]],
                team_a: (
                    units: [(type: archer, position: (x: 1, y: 0))],
                    script: "\"idle\"",
                ),
                team_b: (
                    units: [(type: archer, position: (x: 7, y: 2))],
                    script: "()",
                ),
                max_ticks: 20,
                seed: 4,
            ),
        )
        "#,
    );

    let scenario = Scenario::resolve(path.to_str().unwrap()).unwrap();
    assert_eq!(scenario.name, "standoff");
    assert_eq!(scenario.config.seed, 4);

    let report = BackendSelector::reference()
        .run_simulation(&scenario.config)
        .unwrap();
    assert_eq!(report.total_ticks, 20);
}

#[test]
fn test_json_scenario_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skirmish.json");
    let scenario = Scenario::new("seeded", "fixture skirmish", skirmish_config(12));
    scenario.save(&path).unwrap();

    let loaded = Scenario::load(&path).unwrap();
    assert_eq!(loaded, scenario);
}

#[test]
fn test_ron_scenario_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("siege.ron");
    let scenario = Scenario::siege();
    scenario.save(&path).unwrap();
    assert_eq!(Scenario::load(&path).unwrap(), scenario);
}

#[test]
fn test_scenario_errors() {
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        Scenario::resolve("missing.ron"),
        Err(ScenarioError::FileNotFound(_))
    ));

    let yaml = write(&dir, "duel.yaml", "name: duel");
    assert!(matches!(
        Scenario::load(&yaml),
        Err(ScenarioError::UnsupportedFormat(_))
    ));

    let bad_ron = write(&dir, "bad.ron", "Scenario(name: ");
    assert!(matches!(Scenario::load(&bad_ron), Err(ScenarioError::Ron(_))));

    let bad_json = write(&dir, "bad.json", "{\"name\": 3}");
    assert!(matches!(Scenario::load(&bad_json), Err(ScenarioError::Json(_))));

    let empty_roster = write(
        &dir,
        "empty.json",
        r#"{"name": "empty", "config": {
            "grid_width": 5, "grid_height": 5,
            "team_a": {"units": []},
            "team_b": {"units": [{"type": "tank", "position": {"x": 0, "y": 0}}]}
        }}"#,
    );
    assert!(matches!(
        Scenario::load(&empty_roster),
        Err(ScenarioError::Invalid(_))
    ));
}

#[test]
fn test_strategy_file_replaces_script() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "camp.ron",
        r#"Strategy(name: "camp", description: "never moves", script: "\"idle\"")"#,
    );
    let strategy = Strategy::resolve(path.to_str().unwrap()).unwrap();
    let scenario = Scenario::duel()
        .with_strategy(Team::A, &strategy)
        .with_strategy(Team::B, &strategy);

    let report = BackendSelector::reference()
        .run_simulation(&scenario.config)
        .unwrap();
    assert_eq!(report.team_a.moves, 0);
    assert_eq!(report.team_b.moves, 0);
    assert_eq!(report.event_count(), 0);
}

#[test]
fn test_recorded_replay_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skirmish.replay");
    let config = skirmish_config(21);

    let report = BackendSelector::reference().run_simulation(&config).unwrap();
    Replay::from_report(config, &report).save(&path).unwrap();

    let replay = Replay::load(&path).unwrap();
    assert_eq!(replay.final_hash, report.final_hash);
    assert!(replay.verify().unwrap().is_match());

    let mut player = ReplayPlayer::new(replay).unwrap();
    assert!(player.verify());
    assert_eq!(player.current_tick(), report.event_log.last().map_or(0, |r| r.tick));
}

#[test]
fn test_tampered_replay_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skirmish.replay");
    let config = skirmish_config(21);

    let report = BackendSelector::reference().run_simulation(&config).unwrap();
    let mut replay = Replay::from_report(config, &report);
    replay.config.seed += 1;
    replay.final_hash ^= 1;
    replay.save(&path).unwrap();

    let verification = Replay::load(&path).unwrap().verify().unwrap();
    assert!(!verification.is_match());
}

#[cfg(feature = "native")]
#[test]
fn test_native_batch_matches_reference_batch() {
    let mut scenario = Scenario::skirmish();
    scenario.config.max_ticks = 120;
    let native = EngineConfig::default()
        .with_backend(BackendKind::Native)
        .build_selector()
        .unwrap();

    let reference = run_batch(
        BatchConfig::new("skirmish", 4).with_seed(3),
        &scenario,
        &BackendSelector::reference(),
    );
    let accelerated = run_batch(BatchConfig::new("skirmish", 4).with_seed(3), &scenario, &native);

    assert_eq!(accelerated.summary.engines.get("native"), Some(&4));
    for (a, b) in reference.matches.iter().zip(&accelerated.matches) {
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.winner, b.winner);
        assert_eq!(a.total_ticks, b.total_ticks);
        assert_eq!(a.final_hash, b.final_hash);
    }
}

#[test]
fn test_batch_results_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results").join("broken.json");
    let scenario = Scenario::new("broken", "", broken_script_config().with_max_ticks(200));

    let results = run_batch(
        BatchConfig::new("broken", 5).with_parallel(2),
        &scenario,
        &BackendSelector::reference(),
    );
    results.save(&path).unwrap();

    let loaded = BatchResults::load(&path).unwrap();
    assert_eq!(loaded.matches.len(), 5);
    assert!(loaded.errors.is_empty());
    assert_eq!(loaded.summary.team_a_wins, 5);
    assert!(loaded.summary.team_b.script_failures > 0.0);
}

#[test]
fn test_stream_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.jsonl");
    let file = std::fs::File::create(&path).unwrap();

    let mut observer = JsonLinesObserver::new(std::io::BufWriter::new(file));
    let report = BackendSelector::reference()
        .run_with_observer(&skirmish_config(2), &mut observer)
        .unwrap();
    observer.finish().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let frames: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(frames.len(), report.event_log.len());
    for (frame, record) in frames.iter().zip(&report.event_log) {
        assert_eq!(frame["tick"].as_u64(), Some(record.tick));
        assert_eq!(
            frame["events"].as_array().map(Vec::len),
            Some(record.events.len())
        );
        assert_eq!(frame["units"].as_array().map(Vec::len), Some(8));
    }
}
