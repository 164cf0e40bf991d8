//! Combat resolver: target resolution, damage formula, critical hits.
//!
//! Damage is `max(MIN_DAMAGE, attack - (defense + terrain bonus) * 1/5)`.
//! Defense is diminishing rather than absolute, and the floor guarantees an
//! attack that lands always hurts.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::decision::AttackTarget;
use crate::events::BattleEvent;
use crate::math::{Fixed, GridPos};
use crate::terrain::TerrainGrid;
use crate::unit::{Capabilities, CriticalCapability, Unit};

/// Minimum damage dealt by any attack that lands.
pub const MIN_DAMAGE: i32 = 5;

/// Cooldown after an attack when no override is set.
pub const DEFAULT_ATTACK_COOLDOWN: u32 = 2;

/// Fraction of total defense subtracted from attack.
#[must_use]
pub fn reduction_factor() -> Fixed {
    Fixed::from_num(1) / Fixed::from_num(5)
}

/// Final damage for one hit.
#[must_use]
pub fn calculate_damage(attack: Fixed, defense: Fixed, terrain_bonus: Fixed, critical: bool) -> Fixed {
    let base = if critical {
        attack.saturating_mul(Fixed::from_num(2))
    } else {
        attack
    };
    let reduction = (defense + terrain_bonus).saturating_mul(reduction_factor());
    base.saturating_sub(reduction).max(Fixed::from_num(MIN_DAMAGE))
}

/// Roll a critical hit.
///
/// Draws one `u32` from the match RNG only when the attacker has the
/// capability, so matches without marksmen never touch the RNG.
pub fn roll_critical(rng: &mut ChaCha8Rng, critical: Option<CriticalCapability>) -> bool {
    let Some(critical) = critical else {
        return false;
    };
    let roll = Fixed::from_bits(i64::from(rng.gen::<u32>()));
    roll < critical.chance
}

/// Cooldown applied after attacking. A zero override counts as unset.
#[must_use]
pub fn attack_cooldown(capabilities: &Capabilities) -> u32 {
    capabilities
        .attack_cooldown
        .filter(|&ticks| ticks > 0)
        .unwrap_or(DEFAULT_ATTACK_COOLDOWN)
}

/// Index of the alive enemy closest to `point`; distance ties keep roster order.
#[must_use]
pub fn closest_enemy(units: &[Unit], attacker: usize, point: GridPos) -> Option<usize> {
    let team = units.get(attacker)?.team;
    let mut best: Option<(usize, Fixed)> = None;
    for (i, other) in units.iter().enumerate() {
        if !other.alive || other.team == team {
            continue;
        }
        let dist = point.distance_squared(other.position);
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((i, dist));
        }
    }
    best.map(|(i, _)| i)
}

/// Resolve an attack target to an alive enemy index.
#[must_use]
pub fn resolve_target(units: &[Unit], attacker: usize, target: AttackTarget) -> Option<usize> {
    let unit = units.get(attacker)?;
    match target {
        AttackTarget::Unit(id) => units
            .iter()
            .position(|u| u.id == id && u.alive && u.team != unit.team),
        AttackTarget::Cell(cell) => closest_enemy(units, attacker, cell),
        AttackTarget::Nearest => closest_enemy(units, attacker, unit.position),
    }
}

/// Apply an attack decision for `units[index]`.
///
/// No-op if the attacker is dead or cooling down, the target does not resolve,
/// or the target is out of range.
pub fn resolve_attack(
    units: &mut [Unit],
    index: usize,
    target: AttackTarget,
    terrain: &TerrainGrid,
    rng: &mut ChaCha8Rng,
) -> Option<BattleEvent> {
    let attacker = units.get(index)?;
    if !attacker.can_act() {
        return None;
    }
    let defender_index = resolve_target(units, index, target)?;
    let defender = &units[defender_index];
    if !attacker.position.within(defender.position, attacker.range) {
        return None;
    }

    let critical = roll_critical(rng, attacker.capabilities.critical);
    let damage = calculate_damage(
        attacker.attack,
        defender.defense,
        terrain.modifier_at(defender.position).defense_bonus,
        critical,
    );
    let attacker_id = attacker.id;
    let cooldown = attack_cooldown(&attacker.capabilities);

    let defender = &mut units[defender_index];
    let target_id = defender.id;
    let (dealt, killed) = defender.take_damage(damage);
    units[index].cooldown = cooldown;

    Some(BattleEvent::Attack {
        attacker: attacker_id,
        target: target_id,
        damage: dealt,
        critical,
        killed,
    })
}
