//! Movement resolver.
//!
//! A move steps the unit toward its target cell: the unit direction vector is
//! scaled by effective speed, each component rounded half up, and the result
//! clamped into the grid. The move is rejected if another alive unit holds the
//! destination.

use crate::events::BattleEvent;
use crate::math::{round_half_up, Fixed, GridPos, Vec2Fixed};
use crate::terrain::{TerrainGrid, TerrainModifier};
use crate::unit::Unit;

/// Speed after terrain; terrain-immune units always use multiplier 1.
#[must_use]
pub fn effective_speed(speed: Fixed, terrain: TerrainModifier, terrain_immune: bool) -> Fixed {
    if terrain_immune {
        speed
    } else {
        speed.saturating_mul(terrain.speed_multiplier)
    }
}

/// Cell reached by stepping from `from` toward `target` at `speed`.
///
/// Targets outside the grid are clamped onto it first. Returns `from`
/// unchanged when already on the target.
#[must_use]
pub fn step_toward(
    from: GridPos,
    target: GridPos,
    speed: Fixed,
    grid_width: u32,
    grid_height: u32,
) -> GridPos {
    let target = target.clamped(grid_width, grid_height);
    if from == target {
        return from;
    }
    let step = Vec2Fixed::between(from, target).normalize().scale(speed);
    from.offset(round_half_up(step.x), round_half_up(step.y))
        .clamped(grid_width, grid_height)
}

/// Apply a move decision for `units[index]`.
///
/// Occupancy is checked against live state, so a cell vacated earlier in the
/// same tick can be entered.
pub fn resolve_move(
    units: &mut [Unit],
    index: usize,
    target: GridPos,
    terrain: &TerrainGrid,
    grid_width: u32,
    grid_height: u32,
) -> Option<BattleEvent> {
    let unit = units.get(index)?;
    if !unit.alive {
        return None;
    }
    let from = unit.position;
    let speed = effective_speed(
        unit.speed,
        terrain.modifier_at(from),
        unit.capabilities.terrain_immunity,
    );
    let to = step_toward(from, target, speed, grid_width, grid_height);
    if to == from {
        return None;
    }

    let mover = unit.id;
    if units
        .iter()
        .any(|other| other.alive && other.id != mover && other.position == to)
    {
        return None;
    }

    units[index].position = to;
    Some(BattleEvent::Move {
        unit: mover,
        from,
        to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::Terrain;
    use crate::unit::{Team, UnitKind};

    fn unit_at(id: u32, team: Team, kind: UnitKind, x: i32, y: i32) -> Unit {
        Unit::new(
            id,
            team,
            kind,
            GridPos::new(x, y),
            kind.base_stats(),
            kind.base_capabilities(),
        )
    }

    #[test]
    fn test_step_straight_line() {
        let to = step_toward(GridPos::new(0, 0), GridPos::new(10, 0), Fixed::from_num(3), 20, 20);
        assert_eq!(to, GridPos::new(3, 0));
    }

    #[test]
    fn test_step_diagonal_rounds_components() {
        // 3 * (1/sqrt2) = 2.12 in each axis.
        let to = step_toward(GridPos::new(0, 0), GridPos::new(9, 9), Fixed::from_num(3), 20, 20);
        assert_eq!(to, GridPos::new(2, 2));
    }

    #[test]
    fn test_step_overshoots_then_clamps() {
        let to = step_toward(GridPos::new(18, 5), GridPos::new(19, 5), Fixed::from_num(5), 20, 20);
        assert_eq!(to, GridPos::new(19, 5));
    }

    #[test]
    fn test_far_targets_are_clamped_onto_grid() {
        let speed = Fixed::from_num(3);
        let to = step_toward(GridPos::new(1, 1), GridPos::new(100_000, 100_000), speed, 10, 10);
        assert_eq!(to, GridPos::new(3, 3));

        let to = step_toward(GridPos::new(5, 1), GridPos::new(i32::MIN, 0), speed, 10, 10);
        assert_eq!(to, GridPos::new(2, 0));

        let to = step_toward(GridPos::new(0, 0), GridPos::new(i32::MAX, i32::MIN), speed, 10, 10);
        assert_eq!(to, GridPos::new(3, 0));
    }

    #[test]
    fn test_step_on_huge_grid_does_not_overflow() {
        let to = step_toward(
            GridPos::new(0, 0),
            GridPos::new(i32::MAX, i32::MAX),
            Fixed::MAX,
            u32::MAX,
            u32::MAX,
        );
        assert!(to.x >= 0 && to.y >= 0);
    }

    #[test]
    fn test_slow_terrain_can_stall() {
        let swamp = Terrain::Swamp.modifier();
        let speed = effective_speed(Fixed::from_num(1), swamp, false);
        assert_eq!(speed, Fixed::from_num(1) / Fixed::from_num(4));
        let to = step_toward(GridPos::new(0, 0), GridPos::new(5, 0), speed, 10, 10);
        assert_eq!(to, GridPos::new(0, 0));
    }

    #[test]
    fn test_immunity_ignores_terrain() {
        let water = Terrain::Water.modifier();
        assert_eq!(effective_speed(Fixed::from_num(5), water, true), Fixed::from_num(5));
    }

    #[test]
    fn test_move_blocked_by_alive_unit() {
        let mut units = vec![
            unit_at(0, Team::A, UnitKind::Soldier, 0, 0),
            unit_at(1, Team::B, UnitKind::Soldier, 3, 0),
        ];
        let terrain = TerrainGrid::default();
        assert!(resolve_move(&mut units, 0, GridPos::new(9, 0), &terrain, 10, 10).is_none());
        assert_eq!(units[0].position, GridPos::new(0, 0));

        units[1].take_damage(Fixed::from_num(1000));
        let event = resolve_move(&mut units, 0, GridPos::new(9, 0), &terrain, 10, 10);
        assert_eq!(
            event,
            Some(BattleEvent::Move {
                unit: 0,
                from: GridPos::new(0, 0),
                to: GridPos::new(3, 0),
            })
        );
    }

    #[test]
    fn test_move_uses_terrain_of_current_cell() {
        let terrain = TerrainGrid::flat(10, 10).with(GridPos::new(0, 0), Terrain::Road);
        let mut units = vec![unit_at(0, Team::A, UnitKind::Archer, 0, 0)];
        // speed 2 * 1.5 = 3
        resolve_move(&mut units, 0, GridPos::new(9, 0), &terrain, 10, 10);
        assert_eq!(units[0].position, GridPos::new(3, 0));
        // now on ground: speed 2
        resolve_move(&mut units, 0, GridPos::new(9, 0), &terrain, 10, 10);
        assert_eq!(units[0].position, GridPos::new(5, 0));
    }
}
