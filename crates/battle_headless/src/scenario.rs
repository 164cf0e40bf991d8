//! Scenario loading.
//!
//! A scenario is a named [`SimulationConfig`] stored as RON or JSON. A few
//! scenarios are built in so the CLI works without any files.

use std::path::Path;

use battle_core::config::{SimulationConfig, TeamConfig, UnitTemplate};
use battle_core::error::BattleError;
use battle_core::math::GridPos;
use battle_core::terrain::{Terrain, TerrainGrid};
use battle_core::unit::{Team, UnitKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategies::Strategy;

/// Names of the built-in scenarios.
pub const BUILTIN_NAMES: [&str; 3] = ["duel", "skirmish", "siege"];

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    Read(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
    /// Failed to parse JSON.
    #[error("Failed to parse scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Neither `.ron` nor `.json`.
    #[error("Unsupported scenario format: {0} (expected .ron or .json)")]
    UnsupportedFormat(String),
    /// Parsed, but cannot start a match.
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] BattleError),
}

/// A named match configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// The match itself.
    pub config: SimulationConfig,
}

impl Scenario {
    /// Wrap a config.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            config,
        }
    }

    /// Load a scenario from a `.ron` or `.json` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let contents = std::fs::read_to_string(path)?;
        let scenario = match extension.as_deref() {
            Some("ron") => Self::from_ron_str(&contents)?,
            Some("json") => Self::from_json_str(&contents)?,
            _ => return Err(ScenarioError::UnsupportedFormat(path.display().to_string())),
        };
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Load from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        Ok(scenario)
    }

    /// Save as pretty RON or JSON, chosen by extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ScenarioError> {
        let path = path.as_ref();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| BattleError::Serialization(e.to_string()))?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => return Err(ScenarioError::UnsupportedFormat(path.display().to_string())),
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Check the config can start a match.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.config.validate()?;
        Ok(())
    }

    /// A built-in scenario by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "duel" => Some(Self::duel()),
            "skirmish" => Some(Self::skirmish()),
            "siege" => Some(Self::siege()),
            _ => None,
        }
    }

    /// A built-in name, or a path to a scenario file.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }

    /// Replace one team's script.
    #[must_use]
    pub fn with_strategy(mut self, team: Team, strategy: &Strategy) -> Self {
        self.config.team_mut(team).script.clone_from(&strategy.script);
        self
    }

    /// Soldier against soldier on open ground.
    #[must_use]
    pub fn duel() -> Self {
        let chase = Strategy::chase().script;
        let config = SimulationConfig::new(10, 5)
            .with_team(
                Team::A,
                TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, 0, 2)], &chase),
            )
            .with_team(
                Team::B,
                TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, 9, 2)], chase),
            );
        Self::new("duel", "One soldier each, both chasing", config)
    }

    /// Mixed squads across a forest line.
    #[must_use]
    pub fn skirmish() -> Self {
        let mut terrain = TerrainGrid::flat(16, 12);
        for y in 2..10 {
            terrain.set(GridPos::new(7, y), Terrain::Forest);
        }
        for x in 0..16 {
            terrain.set(GridPos::new(x, 0), Terrain::Road);
        }
        terrain.set(GridPos::new(8, 5), Terrain::Swamp);
        terrain.set(GridPos::new(8, 6), Terrain::Swamp);
        terrain.set(GridPos::new(12, 8), Terrain::Mountain);

        let team_a = vec![
            UnitTemplate::new(UnitKind::Soldier, 1, 4),
            UnitTemplate::new(UnitKind::Soldier, 1, 7),
            UnitTemplate::new(UnitKind::Archer, 0, 5),
            UnitTemplate::new(UnitKind::Medic, 0, 6),
            UnitTemplate::new(UnitKind::Drone, 1, 0),
        ];
        let team_b = vec![
            UnitTemplate::new(UnitKind::Tank, 14, 5),
            UnitTemplate::new(UnitKind::Soldier, 14, 7),
            UnitTemplate::new(UnitKind::Sniper, 15, 6),
            UnitTemplate::new(UnitKind::Archer, 15, 3),
            UnitTemplate::new(UnitKind::Drone, 14, 0),
        ];
        let config = SimulationConfig::new(16, 12)
            .with_terrain(terrain)
            .with_team(Team::A, TeamConfig::new(team_a, Strategy::focus().script))
            .with_team(Team::B, TeamConfig::new(team_b, Strategy::chase().script))
            .with_max_ticks(500);
        Self::new(
            "skirmish",
            "Five a side across a forest line; focus fire against chase",
            config,
        )
    }

    /// Attackers marching on a fortified line.
    #[must_use]
    pub fn siege() -> Self {
        let mut terrain = TerrainGrid::flat(24, 10);
        for y in 2..8 {
            terrain.set(GridPos::new(19, y), Terrain::Fortress);
        }
        for y in 0..10 {
            terrain.set(GridPos::new(12, y), Terrain::Water);
        }
        terrain.set(GridPos::new(12, 4), Terrain::Ground);
        terrain.set(GridPos::new(12, 5), Terrain::Ground);

        let attackers = vec![
            UnitTemplate::new(UnitKind::Tank, 2, 3),
            UnitTemplate::new(UnitKind::Tank, 2, 6),
            UnitTemplate::new(UnitKind::Soldier, 1, 2),
            UnitTemplate::new(UnitKind::Soldier, 1, 4),
            UnitTemplate::new(UnitKind::Soldier, 1, 5),
            UnitTemplate::new(UnitKind::Soldier, 1, 7),
            UnitTemplate::new(UnitKind::Medic, 0, 4),
            UnitTemplate::new(UnitKind::Medic, 0, 5),
        ];
        let defenders = vec![
            UnitTemplate::new(UnitKind::Archer, 19, 3),
            UnitTemplate::new(UnitKind::Archer, 19, 6),
            UnitTemplate::new(UnitKind::Sniper, 19, 4),
            UnitTemplate::new(UnitKind::Sniper, 19, 5),
            UnitTemplate::new(UnitKind::Soldier, 19, 2),
            UnitTemplate::new(UnitKind::Soldier, 19, 7),
        ];
        let config = SimulationConfig::new(24, 10)
            .with_terrain(terrain)
            .with_team(Team::A, TeamConfig::new(attackers, Strategy::chase().script))
            .with_team(Team::B, TeamConfig::new(defenders, Strategy::hold().script))
            .with_max_ticks(800);
        Self::new(
            "siege",
            "Eight attackers cross a ford to assault a fortified line that holds position",
            config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        for name in BUILTIN_NAMES {
            let scenario = Scenario::builtin(name).unwrap();
            assert_eq!(scenario.name, name);
            scenario.validate().unwrap();
        }
        assert!(Scenario::builtin("nowhere").is_none());
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "tiny",
                description: "smallest possible match",
                config: (
                    grid_width: 4,
                    grid_height: 1,
                    team_a: (units: [(type: soldier, position: (x: 0, y: 0))], script: "()"),
                    team_b: (units: [(type: archer, position: (x: 3, y: 0))]),
                    max_ticks: 10,
                ),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "tiny");
        assert_eq!(scenario.config.max_ticks, 10);
        assert_eq!(scenario.config.team_b.units[0].kind, UnitKind::Archer);
        assert!(scenario.config.team_b.script.is_empty());
        scenario.validate().unwrap();
    }

    #[test]
    fn test_parse_from_json() {
        let json = r#"{
            "name": "tiny",
            "config": {
                "grid_width": 4,
                "grid_height": 2,
                "terrain": [["ground", "forest"], ["lava"]],
                "team_a": {"units": [{"type": "drone", "position": {"x": 0, "y": 0}}]},
                "team_b": {"units": [{"type": "medic", "position": {"x": 3, "y": 1}}]},
                "seed": 9
            }
        }"#;
        let scenario = Scenario::from_json_str(json).unwrap();
        assert!(scenario.description.is_empty());
        assert_eq!(scenario.config.seed, 9);
        assert_eq!(
            scenario.config.terrain.at(GridPos::new(1, 0)),
            Terrain::Forest
        );
        assert_eq!(
            scenario.config.terrain.at(GridPos::new(0, 1)),
            Terrain::Ground
        );
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let mut scenario = Scenario::duel();
        scenario.config.team_b.units.clear();
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Invalid(BattleError::Configuration(_)))
        ));
    }

    #[test]
    fn test_with_strategy_replaces_script() {
        let scenario = Scenario::duel().with_strategy(Team::B, &Strategy::hold());
        assert_eq!(scenario.config.team_b.script, Strategy::hold().script);
        assert_eq!(scenario.config.team_a.script, Strategy::chase().script);
    }
}
