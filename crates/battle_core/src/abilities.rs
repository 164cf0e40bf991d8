//! Special-ability handler.
//!
//! Capabilities are checked in a fixed order before the decision path. A unit
//! with a heal capability never consults its script: it heals the most injured
//! ally in range (lowest health ratio, roster order on ties) or does nothing.

use crate::events::BattleEvent;
use crate::math::Fixed;
use crate::unit::{HealCapability, Unit};

/// Cooldown after healing when the capability's cooldown is zero.
pub const DEFAULT_HEAL_COOLDOWN: u32 = 3;

/// Cooldown applied after a heal.
#[must_use]
pub fn heal_cooldown(heal: &HealCapability) -> u32 {
    if heal.cooldown > 0 {
        heal.cooldown
    } else {
        DEFAULT_HEAL_COOLDOWN
    }
}

/// Index of the injured ally with the lowest health ratio within range.
#[must_use]
pub fn select_heal_target(units: &[Unit], healer: usize, range: Fixed) -> Option<usize> {
    let source = units.get(healer)?;
    let mut best: Option<usize> = None;
    let mut best_ratio = Fixed::from_num(1);
    for (i, ally) in units.iter().enumerate() {
        if i == healer || !ally.alive || ally.team != source.team || !ally.health.is_injured() {
            continue;
        }
        if !source.position.within(ally.position, range) {
            continue;
        }
        let ratio = ally.health.ratio();
        if ratio < best_ratio {
            best_ratio = ratio;
            best = Some(i);
        }
    }
    best
}

/// Run the heal override for `units[index]`.
///
/// Returns `None` (and leaves the cooldown untouched) if the unit cannot heal
/// or no ally needs it.
pub fn resolve_heal(units: &mut [Unit], index: usize) -> Option<BattleEvent> {
    let healer = units.get(index)?;
    if !healer.can_act() {
        return None;
    }
    let heal = healer.capabilities.heal?;
    let healer_id = healer.id;
    let target = select_heal_target(units, index, heal.range)?;

    let amount = units[target].receive_heal(heal.amount);
    units[index].cooldown = heal_cooldown(&heal);
    Some(BattleEvent::Heal {
        healer: healer_id,
        target: units[target].id,
        amount,
    })
}
