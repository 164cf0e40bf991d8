//! Match events and per-tick records.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, GridPos};
use crate::unit::{Unit, UnitId};

/// Something that changed unit state during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleEvent {
    /// A unit changed cell.
    Move {
        /// Mover.
        unit: UnitId,
        /// Cell before the move.
        from: GridPos,
        /// Cell after the move.
        to: GridPos,
    },
    /// A unit hit an enemy.
    Attack {
        /// Attacker.
        attacker: UnitId,
        /// Defender.
        target: UnitId,
        /// Health actually removed; overkill on a lethal hit is not counted.
        #[serde(with = "fixed_serde")]
        damage: Fixed,
        /// Base damage was doubled.
        critical: bool,
        /// The defender died from this hit.
        killed: bool,
    },
    /// A healer restored health to an ally.
    Heal {
        /// Healer.
        healer: UnitId,
        /// Ally healed.
        target: UnitId,
        /// Health actually restored.
        #[serde(with = "fixed_serde")]
        amount: Fixed,
    },
}

impl BattleEvent {
    /// The unit that caused the event.
    #[must_use]
    pub const fn actor(&self) -> UnitId {
        match *self {
            BattleEvent::Move { unit, .. } => unit,
            BattleEvent::Attack { attacker, .. } => attacker,
            BattleEvent::Heal { healer, .. } => healer,
        }
    }

    /// Apply this event to unit state.
    ///
    /// Used to rebuild a match from its initial state. Units are looked up
    /// by id; events naming unknown units are ignored.
    pub fn apply(&self, units: &mut [Unit]) {
        let find = |units: &mut [Unit], id: UnitId| units.iter().position(|u| u.id == id);
        match *self {
            BattleEvent::Move { unit, to, .. } => {
                if let Some(i) = find(units, unit) {
                    units[i].position = to;
                }
            }
            BattleEvent::Attack { target, damage, .. } => {
                if let Some(i) = find(units, target) {
                    units[i].take_damage(damage);
                }
            }
            BattleEvent::Heal { target, amount, .. } => {
                if let Some(i) = find(units, target) {
                    units[i].receive_heal(amount);
                }
            }
        }
    }
}

/// Everything that happened in one tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TickRecord {
    /// Tick number (first processed tick is 1).
    pub tick: u64,
    /// Events in the order they happened.
    pub events: Vec<BattleEvent>,
}

impl TickRecord {
    /// Empty record for a tick.
    #[must_use]
    pub const fn new(tick: u64) -> Self {
        Self {
            tick,
            events: Vec::new(),
        }
    }

    /// True if nothing happened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Receives each completed tick, e.g. for spectators.
pub trait TickObserver {
    /// Called after a tick finishes, with the post-tick unit state.
    fn on_tick(&mut self, record: &TickRecord, units: &[Unit]);
}

impl<F> TickObserver for F
where
    F: FnMut(&TickRecord, &[Unit]),
{
    fn on_tick(&mut self, record: &TickRecord, units: &[Unit]) {
        self(record, units);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl TickObserver for NullObserver {
    fn on_tick(&mut self, _record: &TickRecord, _units: &[Unit]) {}
}
