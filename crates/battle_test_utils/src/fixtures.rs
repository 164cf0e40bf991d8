//! Test fixtures and helpers.
//!
//! Canned decision scripts, unit builders and the reference scenarios used
//! across the workspace's tests and benches.

use battle_core::config::{SimulationConfig, TeamConfig, UnitTemplate};
use battle_core::math::GridPos;
use battle_core::terrain::{Terrain, TerrainGrid};
use battle_core::unit::{Capabilities, Team, UnitKind};
use serde::de::DeserializeOwned;

/// Canned Rhai decision scripts.
pub mod scripts {
    /// Attack the nearest enemy in range, otherwise move toward it.
    pub const CHASE: &str = r#"
        let me = state.unit;
        if state.enemies.len() == 0 {
            return "idle";
        }
        let best = state.enemies[0];
        let best_d = distance(me.x, me.y, best.x, best.y);
        for foe in state.enemies {
            let d = distance(me.x, me.y, foe.x, foe.y);
            if d < best_d {
                best = foe;
                best_d = d;
            }
        }
        if best_d <= me.range {
            return #{ action: "attack", target_id: best.id };
        }
        #{ action: "move", target: best.position }
    "#;

    /// Attack anything in range, never move.
    pub const HOLD: &str = r#"
        let me = state.unit;
        for foe in state.enemies {
            if distance(me.x, me.y, foe.x, foe.y) <= me.range {
                return #{ action: "attack", target_id: foe.id };
            }
        }
        "idle"
    "#;

    /// March forward, attacking the nearest enemy once in range.
    pub const ADVANCE: &str = r#"
        let me = state.unit;
        for foe in state.enemies {
            if distance(me.x, me.y, foe.x, foe.y) <= me.range {
                return #{ action: "attack" };
            }
        }
        #{ action: "move", direction: "forward" }
    "#;

    /// Do nothing.
    pub const IDLE: &str = "()";

    /// Fail on every invocation.
    pub const THROWING: &str = r#"throw "script error";"#;

    /// Never terminates; stopped by the operation budget.
    pub const SPIN: &str = "let n = 0; loop { n += 1; }";

    /// Fails to compile.
    pub const MALFORMED: &str = "let = ;";
}

/// A roster of catalogue units.
#[must_use]
pub fn roster(units: &[(UnitKind, i32, i32)]) -> Vec<UnitTemplate> {
    units
        .iter()
        .map(|&(kind, x, y)| UnitTemplate::new(kind, x, y))
        .collect()
}

/// Config with both rosters and scripts set.
#[must_use]
pub fn battle_config(
    width: u32,
    height: u32,
    team_a: (&[(UnitKind, i32, i32)], &str),
    team_b: (&[(UnitKind, i32, i32)], &str),
) -> SimulationConfig {
    SimulationConfig::new(width, height)
        .with_team(Team::A, TeamConfig::new(roster(team_a.0), team_a.1))
        .with_team(Team::B, TeamConfig::new(roster(team_b.0), team_b.1))
}

/// Soldier against soldier, both chasing, flat terrain.
///
/// The soldiers meet after one tick and trade blows; team A acts first and
/// lands the killing blow on tick 16.
#[must_use]
pub fn duel_config() -> SimulationConfig {
    battle_config(
        10,
        10,
        (&[(UnitKind::Soldier, 0, 0)], scripts::CHASE),
        (&[(UnitKind::Soldier, 7, 0)], scripts::CHASE),
    )
}

/// A medic behind a soldier under fire from an archer that stops shooting
/// after tick 4. The medic stays out of the archer's range.
#[must_use]
pub fn healer_config() -> SimulationConfig {
    let archer = r#"
        if state.tick > 4 {
            return "idle";
        }
    "#
    .to_string()
        + scripts::HOLD;
    battle_config(
        12,
        10,
        (
            &[(UnitKind::Medic, 3, 5), (UnitKind::Soldier, 5, 5)],
            scripts::IDLE,
        ),
        (&[(UnitKind::Archer, 8, 5)], &archer),
    )
}

/// Two speed-5 drones crossing forest rows; only the first keeps its
/// terrain immunity.
#[must_use]
pub fn terrain_crossing_config() -> SimulationConfig {
    let mut terrain = TerrainGrid::flat(20, 5);
    for x in 0..20 {
        terrain.set(GridPos::new(x, 0), Terrain::Forest);
        terrain.set(GridPos::new(x, 2), Terrain::Forest);
    }
    let units = vec![
        UnitTemplate::new(UnitKind::Drone, 0, 0),
        UnitTemplate::new(UnitKind::Drone, 0, 2).with_special(Capabilities::default()),
    ];
    SimulationConfig::new(20, 5)
        .with_terrain(terrain)
        .with_team(
            Team::A,
            TeamConfig::new(units, r#"#{ action: "move", direction: "forward" }"#),
        )
        .with_team(
            Team::B,
            TeamConfig::new(roster(&[(UnitKind::Tank, 19, 4)]), scripts::IDLE),
        )
}

/// Team B's script throws on every invocation.
#[must_use]
pub fn broken_script_config() -> SimulationConfig {
    battle_config(
        10,
        10,
        (
            &[(UnitKind::Soldier, 0, 0), (UnitKind::Archer, 0, 2)],
            scripts::CHASE,
        ),
        (
            &[(UnitKind::Soldier, 9, 0), (UnitKind::Tank, 9, 2)],
            scripts::THROWING,
        ),
    )
}

/// Mixed four-a-side battle with terrain and every unit kind.
#[must_use]
pub fn skirmish_config(seed: u64) -> SimulationConfig {
    let mut terrain = TerrainGrid::flat(16, 12);
    for y in 3..9 {
        terrain.set(GridPos::new(7, y), Terrain::Forest);
        terrain.set(GridPos::new(8, y), Terrain::Swamp);
    }
    terrain.set(GridPos::new(2, 6), Terrain::Fortress);
    terrain.set(GridPos::new(13, 6), Terrain::Mountain);
    battle_config(
        16,
        12,
        (
            &[
                (UnitKind::Tank, 2, 5),
                (UnitKind::Sniper, 0, 6),
                (UnitKind::Medic, 1, 7),
                (UnitKind::Drone, 2, 9),
            ],
            scripts::CHASE,
        ),
        (
            &[
                (UnitKind::Soldier, 13, 5),
                (UnitKind::Archer, 15, 6),
                (UnitKind::Soldier, 13, 7),
                (UnitKind::Tank, 14, 2),
            ],
            scripts::CHASE,
        ),
    )
    .with_seed(seed)
}

/// Large battle for throughput measurements: `per_side` units per team in
/// facing columns.
#[must_use]
pub fn massed_config(per_side: u32, seed: u64) -> SimulationConfig {
    let height = per_side.max(1);
    let column = |team_x: i32, kinds: [UnitKind; 3]| -> Vec<UnitTemplate> {
        (0..height)
            .map(|i| {
                let y = i32::try_from(i).unwrap_or(i32::MAX);
                UnitTemplate::new(kinds[i as usize % kinds.len()], team_x, y)
            })
            .collect()
    };
    SimulationConfig::new(40, height)
        .with_team(
            Team::A,
            TeamConfig::new(
                column(2, [UnitKind::Soldier, UnitKind::Archer, UnitKind::Sniper]),
                scripts::CHASE,
            ),
        )
        .with_team(
            Team::B,
            TeamConfig::new(
                column(37, [UnitKind::Tank, UnitKind::Soldier, UnitKind::Drone]),
                scripts::CHASE,
            ),
        )
        .with_seed(seed)
}

/// Parse a RON fixture.
///
/// # Panics
///
/// Panics if the source does not parse.
#[must_use]
pub fn from_ron<T: DeserializeOwned>(source: &str) -> T {
    match ron::from_str(source) {
        Ok(value) => value,
        Err(err) => panic!("invalid RON fixture: {err}"),
    }
}
