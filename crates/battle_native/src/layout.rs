//! Flat config layout handed across the bridge.
//!
//! [`KernelConfig`] is a structure-of-arrays rendering of a
//! [`SimulationConfig`]: one array per unit field, terrain flattened to codes.
//! Translation is lossless in both directions, so
//! `KernelConfig::from_config(&c)?.to_config()? == c` for every config the
//! kernel accepts.

use battle_core::config::{SandboxLimits, SimulationConfig, TeamConfig, UnitTemplate};
use battle_core::math::{Fixed, GridPos};
use battle_core::terrain::{Terrain, TerrainGrid};
use battle_core::unit::{
    Capabilities, CriticalCapability, HealCapability, Team, UnitKind, UnitStats,
};
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Most units a kernel match may hold.
pub const MAX_UNITS: usize = 1024;

/// Longest grid side the occupancy grid supports.
pub const MAX_GRID_SIDE: u32 = 4096;

/// Capability overrides as raw fixed-point bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpecial {
    /// `(amount, range, cooldown)`.
    pub heal: Option<(i64, i64, u32)>,
    /// Ignores terrain speed.
    pub terrain_immunity: bool,
    /// Critical chance.
    pub critical: Option<i64>,
    /// Attack cooldown override.
    pub attack_cooldown: Option<u32>,
}

impl KernelSpecial {
    fn encode(caps: &Capabilities) -> Self {
        Self {
            heal: caps
                .heal
                .map(|h| (h.amount.to_bits(), h.range.to_bits(), h.cooldown)),
            terrain_immunity: caps.terrain_immunity,
            critical: caps.critical.map(|c| c.chance.to_bits()),
            attack_cooldown: caps.attack_cooldown,
        }
    }

    fn decode(self) -> Capabilities {
        Capabilities {
            heal: self.heal.map(|(amount, range, cooldown)| HealCapability {
                amount: Fixed::from_bits(amount),
                range: Fixed::from_bits(range),
                cooldown,
            }),
            terrain_immunity: self.terrain_immunity,
            critical: self.critical.map(|chance| CriticalCapability {
                chance: Fixed::from_bits(chance),
            }),
            attack_cooldown: self.attack_cooldown,
        }
    }
}

fn encode_stats(stats: &UnitStats) -> [i64; 5] {
    [
        stats.health.to_bits(),
        stats.attack.to_bits(),
        stats.defense.to_bits(),
        stats.speed.to_bits(),
        stats.range.to_bits(),
    ]
}

fn decode_stats(bits: [i64; 5]) -> UnitStats {
    UnitStats {
        health: Fixed::from_bits(bits[0]),
        attack: Fixed::from_bits(bits[1]),
        defense: Fixed::from_bits(bits[2]),
        speed: Fixed::from_bits(bits[3]),
        range: Fixed::from_bits(bits[4]),
    }
}

/// Structure-of-arrays match config.
///
/// Unit arrays hold team A's roster followed by team B's; `team_sizes`
/// splits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Grid columns.
    pub width: u32,
    /// Grid rows.
    pub height: u32,
    /// Stored cells per terrain row.
    pub terrain_row_lengths: Vec<u32>,
    /// Terrain codes, rows concatenated.
    pub terrain_codes: Vec<u8>,
    /// Roster lengths, `[team A, team B]`.
    pub team_sizes: [u32; 2],
    /// Unit kind codes.
    pub kinds: Vec<u8>,
    /// Start columns as written in the roster.
    pub xs: Vec<i32>,
    /// Start rows as written in the roster.
    pub ys: Vec<i32>,
    /// Stat overrides as raw bits: health, attack, defense, speed, range.
    pub stats: Vec<Option<[i64; 5]>>,
    /// Capability overrides.
    pub specials: Vec<Option<KernelSpecial>>,
    /// Decision scripts, `[team A, team B]`.
    pub scripts: [String; 2],
    /// Tick budget.
    pub max_ticks: u32,
    /// RNG seed.
    pub seed: u64,
    /// Sandbox caps.
    pub limits: SandboxLimits,
}

impl KernelConfig {
    /// Flatten a config, rejecting matches beyond the kernel's limits.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, KernelError> {
        let count = config.team_a.units.len() + config.team_b.units.len();
        if count > MAX_UNITS {
            return Err(KernelError::TooManyUnits {
                count,
                limit: MAX_UNITS,
            });
        }
        if config.grid_width > MAX_GRID_SIDE || config.grid_height > MAX_GRID_SIDE {
            return Err(KernelError::GridTooLarge {
                width: config.grid_width,
                height: config.grid_height,
                limit: MAX_GRID_SIDE,
            });
        }

        let rows = config.terrain.rows();
        let mut layout = Self {
            width: config.grid_width,
            height: config.grid_height,
            terrain_row_lengths: rows.iter().map(|r| r.len() as u32).collect(),
            terrain_codes: rows.iter().flatten().map(|t| t.code()).collect(),
            team_sizes: [
                config.team_a.units.len() as u32,
                config.team_b.units.len() as u32,
            ],
            kinds: Vec::with_capacity(count),
            xs: Vec::with_capacity(count),
            ys: Vec::with_capacity(count),
            stats: Vec::with_capacity(count),
            specials: Vec::with_capacity(count),
            scripts: [config.team_a.script.clone(), config.team_b.script.clone()],
            max_ticks: config.max_ticks,
            seed: config.seed,
            limits: config.limits,
        };
        for team in Team::BOTH {
            for template in &config.team(team).units {
                layout.kinds.push(template.kind.code());
                layout.xs.push(template.position.x);
                layout.ys.push(template.position.y);
                layout.stats.push(template.stats.as_ref().map(encode_stats));
                layout.specials.push(template.special.as_ref().map(KernelSpecial::encode));
            }
        }
        Ok(layout)
    }

    /// Total units.
    pub fn unit_count(&self) -> usize {
        self.kinds.len()
    }

    /// Rebuild the config this layout was flattened from.
    pub fn to_config(&self) -> Result<SimulationConfig, KernelError> {
        let count = self.unit_count();
        let declared = self.team_sizes[0] as usize + self.team_sizes[1] as usize;
        if [self.xs.len(), self.ys.len(), self.stats.len(), self.specials.len(), declared]
            .iter()
            .any(|&len| len != count)
        {
            return Err(KernelError::Layout(format!(
                "unit arrays disagree on length (expected {count})"
            )));
        }
        let cells: usize = self.terrain_row_lengths.iter().map(|&l| l as usize).sum();
        if cells != self.terrain_codes.len() {
            return Err(KernelError::Layout(format!(
                "terrain rows declare {cells} cells, found {}",
                self.terrain_codes.len()
            )));
        }

        let mut codes = self.terrain_codes.iter();
        let rows = self
            .terrain_row_lengths
            .iter()
            .map(|&len| {
                codes
                    .by_ref()
                    .take(len as usize)
                    .map(|&c| Terrain::from_code(c))
                    .collect()
            })
            .collect();

        let mut rosters: [Vec<UnitTemplate>; 2] = [Vec::new(), Vec::new()];
        for i in 0..count {
            let kind = UnitKind::from_code(self.kinds[i])
                .ok_or(KernelError::UnknownKind(self.kinds[i]))?;
            let mut template = UnitTemplate::new(kind, self.xs[i], self.ys[i]);
            template.stats = self.stats[i].map(decode_stats);
            template.special = self.specials[i].map(KernelSpecial::decode);
            let team = if i < self.team_sizes[0] as usize { 0 } else { 1 };
            rosters[team].push(template);
        }
        let [units_a, units_b] = rosters;
        let [script_a, script_b] = self.scripts.clone();

        Ok(SimulationConfig::new(self.width, self.height)
            .with_terrain(TerrainGrid::from_rows(rows))
            .with_team(Team::A, TeamConfig::new(units_a, script_a))
            .with_team(Team::B, TeamConfig::new(units_b, script_b))
            .with_max_ticks(self.max_ticks)
            .with_seed(self.seed)
            .with_limits(self.limits))
    }

    /// Start cell of unit `i`, clamped into the grid.
    pub fn start_cell(&self, i: usize) -> GridPos {
        GridPos::new(self.xs[i], self.ys[i]).clamped(self.width, self.height)
    }
}
