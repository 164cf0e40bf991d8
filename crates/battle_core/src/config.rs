//! Simulation configuration: grid, terrain, rosters, scripts and limits.
//!
//! A [`SimulationConfig`] is immutable once handed to an engine. Validation
//! rejects configs that cannot produce a meaningful match; everything else is
//! handled with defensive clamps at runtime.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::math::{Fixed, GridPos};
use crate::terrain::TerrainGrid;
use crate::unit::{Capabilities, Team, Unit, UnitId, UnitKind, UnitStats};

/// Default tick budget for a match.
pub const DEFAULT_MAX_TICKS: u32 = 1000;

/// Default interpreter operation budget per script invocation.
pub const DEFAULT_MAX_OPERATIONS: u64 = 50_000;

/// A unit entry in a team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTemplate {
    /// Archetype.
    #[serde(rename = "type")]
    pub kind: UnitKind,
    /// Starting cell.
    pub position: GridPos,
    /// Stats; catalogue defaults for the kind when absent.
    #[serde(default)]
    pub stats: Option<UnitStats>,
    /// Special abilities; catalogue defaults for the kind when absent.
    #[serde(default)]
    pub special: Option<Capabilities>,
}

impl UnitTemplate {
    /// Catalogue unit of `kind` at `(x, y)`.
    #[must_use]
    pub const fn new(kind: UnitKind, x: i32, y: i32) -> Self {
        Self {
            kind,
            position: GridPos::new(x, y),
            stats: None,
            special: None,
        }
    }

    /// Override stats.
    #[must_use]
    pub const fn with_stats(mut self, stats: UnitStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Override special abilities.
    #[must_use]
    pub const fn with_special(mut self, special: Capabilities) -> Self {
        self.special = Some(special);
        self
    }

    /// Stats after applying catalogue defaults.
    #[must_use]
    pub fn resolved_stats(&self) -> UnitStats {
        self.stats.unwrap_or_else(|| self.kind.base_stats())
    }

    /// Capabilities after applying catalogue defaults.
    #[must_use]
    pub fn resolved_capabilities(&self) -> Capabilities {
        self.special
            .unwrap_or_else(|| self.kind.base_capabilities())
    }
}

/// One side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Roster in processing order.
    pub units: Vec<UnitTemplate>,
    /// Behaviour script source.
    #[serde(default)]
    pub script: String,
}

impl TeamConfig {
    /// Roster plus script.
    #[must_use]
    pub fn new(units: Vec<UnitTemplate>, script: impl Into<String>) -> Self {
        Self {
            units,
            script: script.into(),
        }
    }
}

/// Resource caps for the decision sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Interpreter operations per invocation before the call is aborted.
    pub max_operations: u64,
    /// Maximum function call nesting.
    pub max_call_depth: usize,
    /// Maximum string length a script may build.
    pub max_string_size: usize,
    /// Maximum array length a script may build.
    pub max_array_size: usize,
    /// Maximum object map size a script may build.
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_depth: 32,
            max_string_size: 4096,
            max_array_size: 4096,
            max_map_size: 256,
        }
    }
}

/// Complete input for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Grid columns.
    pub grid_width: u32,
    /// Grid rows.
    pub grid_height: u32,
    /// Terrain, `terrain[y][x]`.
    #[serde(default)]
    pub terrain: TerrainGrid,
    /// First team.
    pub team_a: TeamConfig,
    /// Second team.
    pub team_b: TeamConfig,
    /// Hard tick budget.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,
    /// Seed for the per-match RNG (critical hits).
    #[serde(default)]
    pub seed: u64,
    /// Sandbox caps.
    #[serde(default)]
    pub limits: SandboxLimits,
}

fn default_max_ticks() -> u32 {
    DEFAULT_MAX_TICKS
}

impl SimulationConfig {
    /// Flat-terrain config with empty rosters and scripts.
    #[must_use]
    pub fn new(grid_width: u32, grid_height: u32) -> Self {
        Self {
            grid_width,
            grid_height,
            terrain: TerrainGrid::default(),
            team_a: TeamConfig::default(),
            team_b: TeamConfig::default(),
            max_ticks: DEFAULT_MAX_TICKS,
            seed: 0,
            limits: SandboxLimits::default(),
        }
    }

    /// Set the terrain.
    #[must_use]
    pub fn with_terrain(mut self, terrain: TerrainGrid) -> Self {
        self.terrain = terrain;
        self
    }

    /// Set a team's roster and script.
    #[must_use]
    pub fn with_team(mut self, team: Team, config: TeamConfig) -> Self {
        *self.team_mut(team) = config;
        self
    }

    /// Set the tick budget.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Set the RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set sandbox limits.
    #[must_use]
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Team config by side.
    #[must_use]
    pub const fn team(&self, team: Team) -> &TeamConfig {
        match team {
            Team::A => &self.team_a,
            Team::B => &self.team_b,
        }
    }

    /// Mutable team config by side.
    pub fn team_mut(&mut self, team: Team) -> &mut TeamConfig {
        match team {
            Team::A => &mut self.team_a,
            Team::B => &mut self.team_b,
        }
    }

    /// Parse a config from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| BattleError::config(format!("RON: {e}")))
    }

    /// Parse a config from JSON.
    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| BattleError::config(format!("JSON: {e}")))
    }

    /// Check the config can start a match.
    pub fn validate(&self) -> Result<()> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(BattleError::config(format!(
                "grid must be non-empty, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if i32::try_from(self.grid_width).is_err() || i32::try_from(self.grid_height).is_err() {
            return Err(BattleError::config("grid dimensions overflow i32"));
        }
        if self.max_ticks == 0 {
            return Err(BattleError::config("max_ticks must be at least 1"));
        }

        let mut occupied = HashSet::new();
        for team in Team::BOTH {
            let roster = &self.team(team).units;
            if roster.is_empty() {
                return Err(BattleError::config(format!("{team} roster is empty")));
            }
            for (index, template) in roster.iter().enumerate() {
                if template.resolved_stats().health <= Fixed::ZERO {
                    return Err(BattleError::config(format!(
                        "{team} unit {index} ({}) has non-positive health",
                        template.kind
                    )));
                }
                let cell = template.position.clamped(self.grid_width, self.grid_height);
                if !occupied.insert(cell) {
                    return Err(BattleError::config(format!(
                        "{team} unit {index} starts on occupied cell ({}, {})",
                        cell.x, cell.y
                    )));
                }
            }
        }
        Ok(())
    }

    /// Instantiate units from both rosters: team A first, then team B.
    ///
    /// Start positions are clamped into the grid.
    #[must_use]
    pub fn build_units(&self) -> Vec<Unit> {
        let mut units = Vec::with_capacity(self.team_a.units.len() + self.team_b.units.len());
        let mut next_id: UnitId = 0;
        for team in Team::BOTH {
            for template in &self.team(team).units {
                units.push(Unit::new(
                    next_id,
                    team,
                    template.kind,
                    template.position.clamped(self.grid_width, self.grid_height),
                    template.resolved_stats(),
                    template.resolved_capabilities(),
                ));
                next_id = next_id.saturating_add(1);
            }
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duel() -> SimulationConfig {
        SimulationConfig::new(10, 10)
            .with_team(Team::A, TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, 0, 0)], ""))
            .with_team(Team::B, TeamConfig::new(vec![UnitTemplate::new(UnitKind::Archer, 9, 9)], ""))
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(duel().validate().is_ok());
    }

    #[test]
    fn test_empty_roster_rejected() {
        let config = duel().with_team(Team::B, TeamConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("teamB"));
    }

    #[test]
    fn test_zero_grid_rejected() {
        let mut config = duel();
        config.grid_height = 0;
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_overlapping_start_rejected_after_clamp() {
        let config = duel().with_team(
            Team::B,
            TeamConfig::new(vec![UnitTemplate::new(UnitKind::Tank, -3, 0)], ""),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_units_assigns_ids_in_roster_order() {
        let config = duel().with_team(
            Team::A,
            TeamConfig::new(
                vec![
                    UnitTemplate::new(UnitKind::Soldier, 0, 0),
                    UnitTemplate::new(UnitKind::Medic, 0, 1),
                ],
                "",
            ),
        );
        let units = config.build_units();
        assert_eq!(units.len(), 3);
        assert_eq!((units[0].id, units[0].team), (0, Team::A));
        assert_eq!((units[1].id, units[1].kind), (1, UnitKind::Medic));
        assert_eq!((units[2].id, units[2].team), (2, Team::B));
        assert!(units[1].capabilities.heal.is_some());
    }

    #[test]
    fn test_out_of_bounds_start_is_clamped() {
        let config = duel().with_team(
            Team::B,
            TeamConfig::new(vec![UnitTemplate::new(UnitKind::Tank, 40, 5)], ""),
        );
        let units = config.build_units();
        assert_eq!(units[1].position, GridPos::new(9, 5));
    }

    #[test]
    fn test_json_config_with_defaults() {
        let json = r#"{
            "grid_width": 20,
            "grid_height": 20,
            "terrain": [["ground", "forest"]],
            "team_a": { "units": [ { "type": "sniper", "position": { "x": 1, "y": 1 } } ], "script": "\"idle\"" },
            "team_b": { "units": [ { "type": "soldier", "position": { "x": 5, "y": 5 },
                                     "stats": { "health": 120, "attack": 10, "defense": 4, "speed": 2, "range": 1.5 } } ] }
        }"#;
        let config = SimulationConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_ticks, DEFAULT_MAX_TICKS);
        assert_eq!(config.limits, SandboxLimits::default());
        let units = config.build_units();
        assert_eq!(units[0].capabilities.attack_cooldown, Some(5));
        assert_eq!(units[1].health.max, Fixed::from_num(120));
        assert_eq!(units[1].range, Fixed::from_num(1.5));
    }

    #[test]
    fn test_ron_config() {
        let ron = r#"(
            grid_width: 8,
            grid_height: 4,
            team_a: (units: [(type: drone, position: (x: 0, y: 0))], script: "\"idle\""),
            team_b: (units: [(type: tank, position: (x: 7, y: 3))]),
            max_ticks: 50,
            seed: 9,
        )"#;
        let config = SimulationConfig::from_ron_str(ron).unwrap();
        assert_eq!(config.max_ticks, 50);
        assert_eq!(config.seed, 9);
        assert!(config.validate().is_ok());
    }
}
