//! Decisions and the read-only battlefield view handed to decision makers.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::{Fixed, GridPos};
use crate::terrain::TerrainGrid;
use crate::unit::{Team, Unit, UnitId, UnitKind};

/// What an attack is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackTarget {
    /// A specific unit.
    Unit(UnitId),
    /// The enemy closest to this cell.
    Cell(GridPos),
    /// The enemy closest to the attacker.
    Nearest,
}

/// One unit's action for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Decision {
    /// Do nothing.
    #[default]
    Idle,
    /// Step toward a cell.
    Move(GridPos),
    /// Attack.
    Attack(AttackTarget),
}

/// The acting unit as seen by its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfView {
    /// Unit id.
    pub id: UnitId,
    /// Team.
    pub team: Team,
    /// Archetype.
    pub kind: UnitKind,
    /// Cell.
    pub position: GridPos,
    /// Current health.
    pub health: Fixed,
    /// Maximum health.
    pub max_health: Fixed,
    /// Attack.
    pub attack: Fixed,
    /// Defense.
    pub defense: Fixed,
    /// Speed.
    pub speed: Fixed,
    /// Range.
    pub range: Fixed,
}

impl SelfView {
    /// Project a unit.
    #[must_use]
    pub fn of(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            team: unit.team,
            kind: unit.kind,
            position: unit.position,
            health: unit.health.current,
            max_health: unit.health.max,
            attack: unit.attack,
            defense: unit.defense,
            speed: unit.speed,
            range: unit.range,
        }
    }
}

/// Another unit as seen by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactView {
    /// Unit id.
    pub id: UnitId,
    /// Cell.
    pub position: GridPos,
    /// Current health.
    pub health: Fixed,
    /// Archetype.
    pub kind: UnitKind,
}

impl ContactView {
    /// Project a unit.
    #[must_use]
    pub fn of(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            position: unit.position,
            health: unit.health.current,
            kind: unit.kind,
        }
    }
}

/// Read-only projection of the tick-start state for one acting unit.
#[derive(Debug, Clone)]
pub struct BattleView<'a> {
    /// The acting unit.
    pub unit: SelfView,
    /// Alive enemies, roster order.
    pub enemies: Vec<ContactView>,
    /// Alive allies excluding the actor, roster order.
    pub allies: Vec<ContactView>,
    /// Terrain.
    pub terrain: &'a TerrainGrid,
    /// Current tick.
    pub tick: u64,
    /// Grid columns.
    pub grid_width: u32,
    /// Grid rows.
    pub grid_height: u32,
}

impl<'a> BattleView<'a> {
    /// Build the view for `actor` from a tick-start snapshot.
    #[must_use]
    pub fn observe(
        snapshot: &[Unit],
        actor: &Unit,
        terrain: &'a TerrainGrid,
        tick: u64,
        grid_width: u32,
        grid_height: u32,
    ) -> Self {
        let mut enemies = Vec::new();
        let mut allies = Vec::new();
        for other in snapshot.iter().filter(|u| u.alive && u.id != actor.id) {
            if other.team == actor.team {
                allies.push(ContactView::of(other));
            } else {
                enemies.push(ContactView::of(other));
            }
        }
        Self {
            unit: SelfView::of(actor),
            enemies,
            allies,
            terrain,
            tick,
            grid_width,
            grid_height,
        }
    }
}

/// Produces one decision per acting unit per tick.
///
/// Errors are recovered by the scheduler as [`Decision::Idle`]; an
/// implementation never needs to guard against its own failures.
pub trait DecisionMaker: Send {
    /// Decide for the unit described by `view`.
    fn decide(&mut self, view: &BattleView<'_>) -> Result<Decision>;
}

/// A decision maker that always idles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleDecider;

impl DecisionMaker for IdleDecider {
    fn decide(&mut self, _view: &BattleView<'_>) -> Result<Decision> {
        Ok(Decision::Idle)
    }
}

impl<F> DecisionMaker for F
where
    F: FnMut(&BattleView<'_>) -> Decision + Send,
{
    fn decide(&mut self, view: &BattleView<'_>) -> Result<Decision> {
        Ok(self(view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitKind;

    fn unit(id: UnitId, team: Team, x: i32) -> Unit {
        Unit::new(
            id,
            team,
            UnitKind::Soldier,
            GridPos::new(x, 0),
            UnitKind::Soldier.base_stats(),
            UnitKind::Soldier.base_capabilities(),
        )
    }

    #[test]
    fn test_view_excludes_self_and_dead() {
        let mut units = vec![
            unit(0, Team::A, 0),
            unit(1, Team::A, 1),
            unit(2, Team::B, 5),
            unit(3, Team::B, 6),
        ];
        units[3].take_damage(Fixed::from_num(1000));
        let terrain = TerrainGrid::default();

        let view = BattleView::observe(&units, &units[0], &terrain, 7, 10, 10);
        assert_eq!(view.unit.id, 0);
        assert_eq!(view.allies.len(), 1);
        assert_eq!(view.allies[0].id, 1);
        assert_eq!(view.enemies.len(), 1);
        assert_eq!(view.enemies[0].id, 2);
        assert_eq!(view.tick, 7);
    }

    #[test]
    fn test_closures_are_decision_makers() {
        let units = vec![unit(0, Team::A, 0), unit(1, Team::B, 3)];
        let terrain = TerrainGrid::default();
        let view = BattleView::observe(&units, &units[0], &terrain, 1, 10, 10);

        let mut charge = |v: &BattleView<'_>| Decision::Move(v.enemies[0].position);
        assert_eq!(charge.decide(&view).unwrap(), Decision::Move(GridPos::new(3, 0)));
        assert_eq!(IdleDecider.decide(&view).unwrap(), Decision::Idle);
    }
}
