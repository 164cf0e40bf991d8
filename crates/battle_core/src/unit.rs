//! Unit model: teams, unit kinds, stats, capabilities and mutable combat state.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, GridPos};

/// Unique identifier for a unit within one match.
///
/// Ids are assigned in roster order: team A's roster first, then team B's.
pub type UnitId = u32;

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    /// First roster; acts first within a tick.
    #[serde(rename = "teamA")]
    A,
    /// Second roster.
    #[serde(rename = "teamB")]
    B,
}

impl Team {
    /// Both teams in processing order.
    pub const BOTH: [Team; 2] = [Team::A, Team::B];

    /// The other team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    /// Stable string id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Team::A => "teamA",
            Team::B => "teamB",
        }
    }

    /// Horizontal direction of "forward" for this team.
    #[must_use]
    pub const fn forward_dx(self) -> i32 {
        match self {
            Team::A => 1,
            Team::B => -1,
        }
    }

    /// Index into per-team arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Team::A => 0,
            Team::B => 1,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Unit archetypes with catalogue defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Balanced infantry.
    Soldier,
    /// Ranged attacker.
    Archer,
    /// Heavy armor.
    Tank,
    /// Fast scout, ignores terrain.
    Drone,
    /// Long range, critical hits, slow attack.
    Sniper,
    /// Heals allies instead of attacking.
    Medic,
}

impl UnitKind {
    /// All kinds, in code order.
    pub const ALL: [UnitKind; 6] = [
        UnitKind::Soldier,
        UnitKind::Archer,
        UnitKind::Tank,
        UnitKind::Drone,
        UnitKind::Sniper,
        UnitKind::Medic,
    ];

    /// Stable string id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            UnitKind::Soldier => "soldier",
            UnitKind::Archer => "archer",
            UnitKind::Tank => "tank",
            UnitKind::Drone => "drone",
            UnitKind::Sniper => "sniper",
            UnitKind::Medic => "medic",
        }
    }

    /// Compact numeric code used by the native kernel.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`UnitKind::code`].
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Catalogue stats: health / attack / defense / speed / range.
    #[must_use]
    pub fn base_stats(self) -> UnitStats {
        let (health, attack, defense, speed, range) = match self {
            UnitKind::Soldier => (100, 15, 10, 3, 1),
            UnitKind::Archer => (80, 20, 5, 2, 3),
            UnitKind::Tank => (150, 25, 20, 2, 2),
            UnitKind::Drone => (50, 12, 2, 5, 4),
            UnitKind::Sniper => (60, 35, 3, 2, 5),
            UnitKind::Medic => (70, 5, 8, 3, 1),
        };
        UnitStats {
            health: Fixed::from_num(health),
            attack: Fixed::from_num(attack),
            defense: Fixed::from_num(defense),
            speed: Fixed::from_num(speed),
            range: Fixed::from_num(range),
        }
    }

    /// Catalogue special abilities.
    #[must_use]
    pub fn base_capabilities(self) -> Capabilities {
        match self {
            UnitKind::Drone => Capabilities::default().with_terrain_immunity(),
            UnitKind::Sniper => Capabilities::default()
                .with_critical(Fixed::from_num(3) / Fixed::from_num(10))
                .with_attack_cooldown(5),
            UnitKind::Medic => Capabilities::default().with_heal(HealCapability {
                amount: Fixed::from_num(15),
                range: Fixed::from_num(2),
                cooldown: 3,
            }),
            UnitKind::Soldier | UnitKind::Archer | UnitKind::Tank => Capabilities::default(),
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Base combat stats of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitStats {
    /// Maximum (and starting) health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Base damage per attack.
    #[serde(with = "fixed_serde")]
    pub attack: Fixed,
    /// Damage reduction input.
    #[serde(with = "fixed_serde")]
    pub defense: Fixed,
    /// Cells moved per tick on neutral terrain.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Attack reach in cells.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
}

/// Healing special ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealCapability {
    /// Health restored per heal.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
    /// Reach in cells.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Ticks between heals.
    pub cooldown: u32,
}

/// Critical-hit special ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriticalCapability {
    /// Probability in `[0, 1]` that an attack deals double base damage.
    #[serde(with = "fixed_serde")]
    pub chance: Fixed,
}

/// Tagged optional abilities attached to a unit.
///
/// Evaluated in a fixed order: heal replaces the decision path entirely,
/// terrain immunity applies during movement, critical hits and the attack
/// cooldown override apply during combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Heals allies instead of acting on a decision.
    pub heal: Option<HealCapability>,
    /// Always moves at full speed regardless of terrain.
    pub terrain_immunity: bool,
    /// Chance to double damage.
    pub critical: Option<CriticalCapability>,
    /// Cooldown applied after an attack instead of the default.
    pub attack_cooldown: Option<u32>,
}

impl Capabilities {
    /// Add a heal capability.
    #[must_use]
    pub const fn with_heal(mut self, heal: HealCapability) -> Self {
        self.heal = Some(heal);
        self
    }

    /// Add terrain immunity.
    #[must_use]
    pub const fn with_terrain_immunity(mut self) -> Self {
        self.terrain_immunity = true;
        self
    }

    /// Add a critical-hit capability.
    #[must_use]
    pub const fn with_critical(mut self, chance: Fixed) -> Self {
        self.critical = Some(CriticalCapability { chance });
        self
    }

    /// Override the post-attack cooldown.
    #[must_use]
    pub const fn with_attack_cooldown(mut self, ticks: u32) -> Self {
        self.attack_cooldown = Some(ticks);
        self
    }
}

/// Health pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    #[serde(with = "fixed_serde")]
    pub current: Fixed,
    /// Maximum health points.
    #[serde(with = "fixed_serde")]
    pub max: Fixed,
}

impl Health {
    /// Full health.
    #[must_use]
    pub const fn new(max: Fixed) -> Self {
        Self { current: max, max }
    }

    /// True once health has reached zero.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.current <= Fixed::ZERO
    }

    /// True when below maximum.
    #[must_use]
    pub fn is_injured(&self) -> bool {
        self.current < self.max
    }

    /// Apply damage clamped at zero, returning the amount actually removed.
    pub fn apply_damage(&mut self, amount: Fixed) -> Fixed {
        let amount = amount.max(Fixed::ZERO);
        let actual = amount.min(self.current.max(Fixed::ZERO));
        self.current = (self.current - actual).max(Fixed::ZERO);
        actual
    }

    /// Heal clamped at max, returning the amount actually restored.
    pub fn heal(&mut self, amount: Fixed) -> Fixed {
        let headroom = (self.max - self.current).max(Fixed::ZERO);
        let actual = amount.max(Fixed::ZERO).min(headroom);
        self.current += actual;
        actual
    }

    /// Current / max.
    #[must_use]
    pub fn ratio(&self) -> Fixed {
        if self.max <= Fixed::ZERO {
            Fixed::ZERO
        } else {
            self.current / self.max
        }
    }
}

/// A unit's full mutable combat state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Match-unique id.
    pub id: UnitId,
    /// Owning team.
    pub team: Team,
    /// Archetype.
    pub kind: UnitKind,
    /// Grid cell.
    pub position: GridPos,
    /// Health pool.
    pub health: Health,
    /// Base damage.
    #[serde(with = "fixed_serde")]
    pub attack: Fixed,
    /// Defense.
    #[serde(with = "fixed_serde")]
    pub defense: Fixed,
    /// Speed in cells per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Attack range.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Ticks until this unit may act again.
    pub cooldown: u32,
    /// False once killed; never flips back.
    pub alive: bool,
    /// Special abilities.
    pub capabilities: Capabilities,
}

impl Unit {
    /// Create a unit at full health.
    #[must_use]
    pub fn new(
        id: UnitId,
        team: Team,
        kind: UnitKind,
        position: GridPos,
        stats: UnitStats,
        capabilities: Capabilities,
    ) -> Self {
        let max = stats.health.max(Fixed::ZERO);
        Self {
            id,
            team,
            kind,
            position,
            health: Health::new(max),
            attack: stats.attack,
            defense: stats.defense,
            speed: stats.speed,
            range: stats.range,
            cooldown: 0,
            alive: max > Fixed::ZERO,
            capabilities,
        }
    }

    /// Stats this unit was built from (max health, not current).
    #[must_use]
    pub fn stats(&self) -> UnitStats {
        UnitStats {
            health: self.health.max,
            attack: self.attack,
            defense: self.defense,
            speed: self.speed,
            range: self.range,
        }
    }

    /// Alive and off cooldown.
    #[must_use]
    pub fn can_act(&self) -> bool {
        self.alive && self.cooldown == 0
    }

    /// Apply damage; returns `(dealt, killed)`. Dead units take no damage.
    pub fn take_damage(&mut self, amount: Fixed) -> (Fixed, bool) {
        if !self.alive {
            return (Fixed::ZERO, false);
        }
        let dealt = self.health.apply_damage(amount);
        if self.health.is_depleted() {
            self.health.current = Fixed::ZERO;
            self.alive = false;
            return (dealt, true);
        }
        (dealt, false)
    }

    /// Heal; dead units cannot be healed.
    pub fn receive_heal(&mut self, amount: Fixed) -> Fixed {
        if !self.alive {
            return Fixed::ZERO;
        }
        self.health.heal(amount)
    }

    /// Count the cooldown down by one tick.
    pub fn tick_cooldown(&mut self) {
        self.cooldown = self.cooldown.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soldier() -> Unit {
        Unit::new(
            0,
            Team::A,
            UnitKind::Soldier,
            GridPos::new(0, 0),
            UnitKind::Soldier.base_stats(),
            UnitKind::Soldier.base_capabilities(),
        )
    }

    #[test]
    fn test_catalogue_defaults() {
        let sniper = UnitKind::Sniper.base_stats();
        assert_eq!(sniper.attack, Fixed::from_num(35));
        assert_eq!(sniper.range, Fixed::from_num(5));

        let caps = UnitKind::Sniper.base_capabilities();
        assert_eq!(caps.attack_cooldown, Some(5));
        assert!(caps.critical.is_some());

        assert!(UnitKind::Drone.base_capabilities().terrain_immunity);
        let heal = UnitKind::Medic.base_capabilities().heal.unwrap();
        assert_eq!(heal.amount, Fixed::from_num(15));
        assert_eq!(heal.cooldown, 3);
    }

    #[test]
    fn test_damage_clamps_and_kills_once() {
        let mut unit = soldier();
        let (dealt, killed) = unit.take_damage(Fixed::from_num(60));
        assert_eq!(dealt, Fixed::from_num(60));
        assert!(!killed);

        let (dealt, killed) = unit.take_damage(Fixed::from_num(60));
        assert_eq!(dealt, Fixed::from_num(40));
        assert!(killed);
        assert_eq!(unit.health.current, Fixed::ZERO);
        assert!(!unit.alive);

        let (dealt, killed) = unit.take_damage(Fixed::from_num(10));
        assert_eq!(dealt, Fixed::ZERO);
        assert!(!killed);
    }

    #[test]
    fn test_heal_clamps_to_max() {
        let mut unit = soldier();
        unit.take_damage(Fixed::from_num(10));
        assert_eq!(unit.receive_heal(Fixed::from_num(15)), Fixed::from_num(10));
        assert_eq!(unit.health.current, unit.health.max);
    }

    #[test]
    fn test_dead_units_cannot_be_healed() {
        let mut unit = soldier();
        unit.take_damage(Fixed::from_num(500));
        assert_eq!(unit.receive_heal(Fixed::from_num(15)), Fixed::ZERO);
        assert!(!unit.alive);
    }

    #[test]
    fn test_cooldown_floor() {
        let mut unit = soldier();
        unit.cooldown = 1;
        unit.tick_cooldown();
        unit.tick_cooldown();
        assert_eq!(unit.cooldown, 0);
        assert!(unit.can_act());
    }

    #[test]
    fn test_team_serde_ids() {
        assert_eq!(serde_json::to_string(&Team::A).unwrap(), "\"teamA\"");
        let kind: UnitKind = serde_json::from_str("\"medic\"").unwrap();
        assert_eq!(kind, UnitKind::Medic);
    }

    #[test]
    fn test_kind_codes() {
        for kind in UnitKind::ALL {
            assert_eq!(UnitKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(UnitKind::from_code(99), None);
    }
}
