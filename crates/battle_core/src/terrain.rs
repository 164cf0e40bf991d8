//! Terrain table and grid lookups.
//!
//! Terrain never changes during a match. Every lookup is total: cells outside
//! the stored grid and unrecognised terrain ids read as [`Terrain::Ground`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::math::{Fixed, GridPos};

/// Terrain kinds known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Terrain {
    /// Open ground, no modifiers.
    #[default]
    Ground,
    /// Deep water: very slow, exposed.
    Water,
    /// High ground.
    Mountain,
    /// Cover.
    Forest,
    /// Fast lane.
    Road,
    /// Mud.
    Swamp,
    /// Open sand.
    Desert,
    /// Fortified position.
    Fortress,
}

/// Movement and defense modifiers for one terrain kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainModifier {
    /// Multiplier applied to unit speed while standing on this terrain.
    pub speed_multiplier: Fixed,
    /// Flat bonus added to defense of a unit standing here.
    pub defense_bonus: Fixed,
}

impl Terrain {
    /// All terrain kinds, in table order.
    pub const ALL: [Terrain; 8] = [
        Terrain::Ground,
        Terrain::Water,
        Terrain::Mountain,
        Terrain::Forest,
        Terrain::Road,
        Terrain::Swamp,
        Terrain::Desert,
        Terrain::Fortress,
    ];

    /// Stable string id used in configs and scripts.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Terrain::Ground => "ground",
            Terrain::Water => "water",
            Terrain::Mountain => "mountain",
            Terrain::Forest => "forest",
            Terrain::Road => "road",
            Terrain::Swamp => "swamp",
            Terrain::Desert => "desert",
            Terrain::Fortress => "fortress",
        }
    }

    /// Parse a terrain id, falling back to ground for anything unknown.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(id))
            .unwrap_or_default()
    }

    /// Compact numeric code used by the native kernel.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Terrain::code`]; unknown codes read as ground.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        Self::ALL.get(usize::from(code)).copied().unwrap_or_default()
    }

    /// Look up the modifiers for this terrain.
    #[must_use]
    pub fn modifier(self) -> TerrainModifier {
        // (speed multiplier in hundredths, defense bonus)
        let (speed_pct, defense) = match self {
            Terrain::Ground => (100, 0),
            Terrain::Water => (10, -5),
            Terrain::Mountain => (30, 10),
            Terrain::Forest => (50, 5),
            Terrain::Road => (150, 0),
            Terrain::Swamp => (25, -3),
            Terrain::Desert => (80, -2),
            Terrain::Fortress => (100, 20),
        };
        TerrainModifier {
            speed_multiplier: Fixed::from_num(speed_pct) / Fixed::from_num(100),
            defense_bonus: Fixed::from_num(defense),
        }
    }
}

impl std::fmt::Display for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for Terrain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for Terrain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Terrain::from_id(&id))
    }
}

/// Row-major terrain grid, indexed `cells[y][x]`.
///
/// The grid may be smaller than the battlefield (or empty); missing cells are
/// ground.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerrainGrid {
    rows: Vec<Vec<Terrain>>,
}

impl TerrainGrid {
    /// Build from explicit rows.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<Terrain>>) -> Self {
        Self { rows }
    }

    /// A uniform grid.
    #[must_use]
    pub fn filled(width: u32, height: u32, terrain: Terrain) -> Self {
        let row = vec![terrain; width as usize];
        Self {
            rows: vec![row; height as usize],
        }
    }

    /// All-ground grid.
    #[must_use]
    pub fn flat(width: u32, height: u32) -> Self {
        Self::filled(width, height, Terrain::Ground)
    }

    /// Set one cell, growing the grid with ground if needed.
    pub fn set(&mut self, pos: GridPos, terrain: Terrain) {
        let (Ok(x), Ok(y)) = (usize::try_from(pos.x), usize::try_from(pos.y)) else {
            return;
        };
        if self.rows.len() <= y {
            self.rows.resize(y + 1, Vec::new());
        }
        let row = &mut self.rows[y];
        if row.len() <= x {
            row.resize(x + 1, Terrain::Ground);
        }
        row[x] = terrain;
    }

    /// Builder form of [`TerrainGrid::set`].
    #[must_use]
    pub fn with(mut self, pos: GridPos, terrain: Terrain) -> Self {
        self.set(pos, terrain);
        self
    }

    /// Terrain at a cell; out-of-range reads as ground.
    #[must_use]
    pub fn at(&self, pos: GridPos) -> Terrain {
        let (Ok(x), Ok(y)) = (usize::try_from(pos.x), usize::try_from(pos.y)) else {
            return Terrain::Ground;
        };
        self.rows
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or_default()
    }

    /// Modifiers at a cell.
    #[must_use]
    pub fn modifier_at(&self, pos: GridPos) -> TerrainModifier {
        self.at(pos).modifier()
    }

    /// Stored rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Terrain>] {
        &self.rows
    }

    /// Number of stored rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// True if no cells are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_table_values() {
        let water = Terrain::Water.modifier();
        assert_eq!(water.defense_bonus, Fixed::from_num(-5));
        assert_eq!(
            water.speed_multiplier,
            Fixed::from_num(10) / Fixed::from_num(100)
        );

        let road = Terrain::Road.modifier();
        assert_eq!(road.speed_multiplier, Fixed::from_num(3) / Fixed::from_num(2));

        assert_eq!(Terrain::Fortress.modifier().defense_bonus, Fixed::from_num(20));
        assert_eq!(Terrain::Ground.modifier().speed_multiplier, Fixed::from_num(1));
    }

    #[test]
    fn test_unknown_id_is_ground() {
        assert_eq!(Terrain::from_id("lava"), Terrain::Ground);
        assert_eq!(Terrain::from_id("Forest"), Terrain::Forest);
    }

    #[test]
    fn test_codes_round_trip_for_every_kind() {
        for terrain in Terrain::ALL {
            assert_eq!(Terrain::from_code(terrain.code()), terrain);
        }
        assert_eq!(Terrain::from_code(200), Terrain::Ground);
    }

    #[test]
    fn test_out_of_range_lookup_is_ground() {
        let grid = TerrainGrid::filled(2, 2, Terrain::Swamp);
        assert_eq!(grid.at(GridPos::new(1, 1)), Terrain::Swamp);
        assert_eq!(grid.at(GridPos::new(5, 0)), Terrain::Ground);
        assert_eq!(grid.at(GridPos::new(-1, 0)), Terrain::Ground);
        assert_eq!(TerrainGrid::default().at(GridPos::new(0, 0)), Terrain::Ground);
    }

    #[test]
    fn test_grid_is_row_major() {
        let grid = TerrainGrid::flat(4, 3).with(GridPos::new(3, 1), Terrain::Mountain);
        assert_eq!(grid.rows()[1][3], Terrain::Mountain);
        assert_eq!(grid.at(GridPos::new(1, 3)), Terrain::Ground);
    }

    #[test]
    fn test_grid_json_uses_ids() {
        let grid: TerrainGrid =
            serde_json::from_str(r#"[["ground","water"],["unknown","road"]]"#).unwrap();
        assert_eq!(grid.at(GridPos::new(1, 0)), Terrain::Water);
        assert_eq!(grid.at(GridPos::new(0, 1)), Terrain::Ground);
        assert_eq!(grid.at(GridPos::new(1, 1)), Terrain::Road);
    }
}
