//! Rhai decision sandbox.
//!
//! Each team's behaviour script is compiled once per match and evaluated once
//! per acting unit per tick. The script sees a single variable, `state`:
//!
//! ```text
//! state.unit     #{ id, team, type, x, y, position: #{x, y}, health, max_health,
//!                   attack, defense, speed, range }
//! state.enemies  [ #{ id, x, y, position, health, type }, ... ]   alive only
//! state.allies   [ ... ]                                          alive, excluding self
//! state.terrain  [[ "ground", "forest", ... ], ...]               terrain[y][x]
//! state.tick, state.width, state.height
//! ```
//!
//! and returns one of:
//!
//! ```text
//! "idle" | ()                              idle
//! #{ action: "move", x: 4, y: 2 }          step toward a cell (also `target: #{x, y}`)
//! #{ action: "move", direction: "up" }     up | down | left | right | forward
//! #{ action: "attack", target_id: 7 }      a specific enemy
//! #{ action: "attack", x: 4, y: 2 }        the enemy closest to a cell
//! #{ action: "attack" }                    the enemy closest to the attacker
//! ```
//!
//! Helpers `distance(ax, ay, bx, by)` and `terrain_at(x, y)` are registered.
//! Every invocation runs under an operation budget; running out is reported
//! like any other script error.

use std::sync::Arc;

use rhai::{Array, Dynamic, Engine, ImmutableString, Map, Scope, AST, FLOAT, INT};
use tracing::{debug, warn};

use crate::config::SandboxLimits;
use crate::decision::{AttackTarget, BattleView, ContactView, Decision, DecisionMaker, SelfView};
use crate::error::{BattleError, Result};
use crate::math::{Fixed, GridPos};
use crate::terrain::TerrainGrid;
use crate::unit::Team;

/// Grids with more cells than this expose only the stored terrain rows to
/// scripts; `terrain_at` still covers every cell.
const MAX_MATERIALIZED_CELLS: u64 = 1 << 16;

/// A compiled team script plus its isolated interpreter.
pub struct ScriptSandbox {
    team: Team,
    engine: Engine,
    ast: Option<AST>,
    /// Built once per match; every `state` map holds a handle to it.
    terrain: Dynamic,
    compile_error: Option<String>,
}

impl std::fmt::Debug for ScriptSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSandbox")
            .field("team", &self.team)
            .field("compiled", &self.ast.is_some())
            .field("compile_error", &self.compile_error)
            .finish_non_exhaustive()
    }
}

impl ScriptSandbox {
    /// Compile a script, failing on parse errors.
    pub fn try_compile(
        team: Team,
        source: &str,
        limits: &SandboxLimits,
        terrain: &TerrainGrid,
        grid_width: u32,
        grid_height: u32,
    ) -> Result<Self> {
        let engine = build_engine(limits, terrain);
        let ast = engine.compile(source).map_err(|e| BattleError::Script {
            team,
            message: e.to_string(),
        })?;
        Ok(Self {
            team,
            engine,
            ast: Some(ast),
            terrain: Dynamic::from_array(terrain_array(terrain, grid_width, grid_height))
                .into_shared(),
            compile_error: None,
        })
    }

    /// Compile a script; on failure the sandbox idles every unit for the
    /// whole match.
    #[must_use]
    pub fn compile(
        team: Team,
        source: &str,
        limits: &SandboxLimits,
        terrain: &TerrainGrid,
        grid_width: u32,
        grid_height: u32,
    ) -> Self {
        match Self::try_compile(team, source, limits, terrain, grid_width, grid_height) {
            Ok(sandbox) => sandbox,
            Err(err) => {
                warn!(%team, error = %err, "script failed to compile, team will idle");
                Self {
                    team,
                    engine: build_engine(limits, terrain),
                    ast: None,
                    terrain: Dynamic::from_array(Array::new()),
                    compile_error: Some(err.to_string()),
                }
            }
        }
    }

    /// Team owning this script.
    #[must_use]
    pub const fn team(&self) -> Team {
        self.team
    }

    /// Compilation error, if the script did not compile.
    #[must_use]
    pub fn compile_error(&self) -> Option<&str> {
        self.compile_error.as_deref()
    }

    /// Run the script for one unit and return its raw value.
    fn evaluate(&self, ast: &AST, view: &BattleView<'_>) -> Result<Dynamic> {
        let mut scope = Scope::new();
        scope.push_constant("state", self.state_map(view));
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| BattleError::Script {
                team: self.team,
                message: e.to_string(),
            })
    }

    fn state_map(&self, view: &BattleView<'_>) -> Dynamic {
        let mut state = Map::new();
        state.insert("unit".into(), self_map(&view.unit));
        state.insert(
            "enemies".into(),
            Dynamic::from_array(view.enemies.iter().map(contact_map).collect()),
        );
        state.insert(
            "allies".into(),
            Dynamic::from_array(view.allies.iter().map(contact_map).collect()),
        );
        state.insert("terrain".into(), self.terrain.clone());
        state.insert("tick".into(), Dynamic::from(int(view.tick)));
        state.insert("width".into(), Dynamic::from(INT::from(view.grid_width)));
        state.insert("height".into(), Dynamic::from(INT::from(view.grid_height)));
        Dynamic::from_map(state)
    }
}

impl DecisionMaker for ScriptSandbox {
    fn decide(&mut self, view: &BattleView<'_>) -> Result<Decision> {
        let Some(ast) = self.ast.as_ref() else {
            return Ok(Decision::Idle);
        };
        let value = self.evaluate(ast, view)?;
        parse_decision(value, view)
    }
}

fn build_engine(limits: &SandboxLimits, terrain: &TerrainGrid) -> Engine {
    let mut engine = Engine::new();
    // Zero means "unlimited" to the interpreter.
    engine.set_max_operations(limits.max_operations.max(1));
    engine.set_max_call_levels(limits.max_call_depth);
    engine.set_max_expr_depths(64, 32);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.disable_symbol("eval");

    engine.on_print(|text| debug!(target: "battle_core::script", "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: "battle_core::script", source = source.unwrap_or(""), ?pos, "{text}");
    });

    engine.register_fn("distance", |ax: INT, ay: INT, bx: INT, by: INT| -> FLOAT {
        let dx = bx as FLOAT - ax as FLOAT;
        let dy = by as FLOAT - ay as FLOAT;
        (dx * dx + dy * dy).sqrt()
    });

    let grid = Arc::new(terrain.clone());
    engine.register_fn("terrain_at", move |x: INT, y: INT| -> ImmutableString {
        grid.at(GridPos::new(saturate(x), saturate(y))).id().into()
    });

    engine
}

fn terrain_array(terrain: &TerrainGrid, grid_width: u32, grid_height: u32) -> Array {
    let cells = u64::from(grid_width) * u64::from(grid_height);
    let to_row = |row: &mut dyn Iterator<Item = &'static str>| -> Dynamic {
        Dynamic::from_array(row.map(|id| Dynamic::from(ImmutableString::from(id))).collect())
    };

    if cells > MAX_MATERIALIZED_CELLS {
        return terrain
            .rows()
            .iter()
            .map(|row| to_row(&mut row.iter().map(|t| t.id())))
            .collect();
    }

    (0..grid_height)
        .map(|y| {
            to_row(&mut (0..grid_width).map(|x| {
                terrain
                    .at(GridPos::new(
                        i32::try_from(x).unwrap_or(i32::MAX),
                        i32::try_from(y).unwrap_or(i32::MAX),
                    ))
                    .id()
            }))
        })
        .collect()
}

fn int(value: u64) -> INT {
    INT::try_from(value).unwrap_or(INT::MAX)
}

fn float(value: Fixed) -> Dynamic {
    Dynamic::from(value.to_num::<FLOAT>())
}

fn saturate(value: INT) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

fn position_map(pos: GridPos) -> Dynamic {
    let mut map = Map::new();
    map.insert("x".into(), Dynamic::from(INT::from(pos.x)));
    map.insert("y".into(), Dynamic::from(INT::from(pos.y)));
    Dynamic::from_map(map)
}

fn self_map(unit: &SelfView) -> Dynamic {
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from(INT::from(unit.id)));
    map.insert("team".into(), Dynamic::from(ImmutableString::from(unit.team.id())));
    map.insert("type".into(), Dynamic::from(ImmutableString::from(unit.kind.id())));
    map.insert("x".into(), Dynamic::from(INT::from(unit.position.x)));
    map.insert("y".into(), Dynamic::from(INT::from(unit.position.y)));
    map.insert("position".into(), position_map(unit.position));
    map.insert("health".into(), float(unit.health));
    map.insert("max_health".into(), float(unit.max_health));
    map.insert("attack".into(), float(unit.attack));
    map.insert("defense".into(), float(unit.defense));
    map.insert("speed".into(), float(unit.speed));
    map.insert("range".into(), float(unit.range));
    Dynamic::from_map(map)
}

fn contact_map(contact: &ContactView) -> Dynamic {
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from(INT::from(contact.id)));
    map.insert("x".into(), Dynamic::from(INT::from(contact.position.x)));
    map.insert("y".into(), Dynamic::from(INT::from(contact.position.y)));
    map.insert("position".into(), position_map(contact.position));
    map.insert("health".into(), float(contact.health));
    map.insert("type".into(), Dynamic::from(ImmutableString::from(contact.kind.id())));
    Dynamic::from_map(map)
}

/// Whole number from an int or float value.
fn number(value: &Dynamic) -> Option<INT> {
    if let Ok(i) = value.as_int() {
        return Some(i);
    }
    match value.as_float() {
        Ok(f) if f.is_finite() => Some(f.round() as INT),
        _ => None,
    }
}

fn cell_of(map: &Map) -> Option<GridPos> {
    let coords = |m: &Map| -> Option<GridPos> {
        let x = number(m.get("x")?)?;
        let y = number(m.get("y")?)?;
        Some(GridPos::new(saturate(x), saturate(y)))
    };
    if let Some(target) = map.get("target").and_then(|t| t.clone().try_cast::<Map>()) {
        if let Some(cell) = coords(&target) {
            return Some(cell);
        }
    }
    coords(map)
}

fn direction_step(name: &str, team: Team) -> Option<(i32, i32)> {
    match name {
        "up" => Some((0, -1)),
        "down" => Some((0, 1)),
        "left" => Some((-1, 0)),
        "right" => Some((1, 0)),
        "forward" => Some((team.forward_dx(), 0)),
        _ => None,
    }
}

fn text(value: &Dynamic) -> Option<String> {
    value.clone().into_string().ok()
}

/// Turn a script's return value into a [`Decision`].
fn parse_decision(value: Dynamic, view: &BattleView<'_>) -> Result<Decision> {
    if value.is_unit() {
        return Ok(Decision::Idle);
    }
    if value.is_string() {
        return match text(&value).as_deref() {
            Some("idle") => Ok(Decision::Idle),
            other => Err(BattleError::InvalidDecision(format!(
                "unknown action {:?}",
                other.unwrap_or_default()
            ))),
        };
    }

    let type_name = value.type_name();
    let Some(map) = value.try_cast::<Map>() else {
        return Err(BattleError::InvalidDecision(format!(
            "expected an object map, got {type_name}"
        )));
    };
    let action = map
        .get("action")
        .and_then(text)
        .ok_or_else(|| BattleError::InvalidDecision("missing action".into()))?;

    match action.as_str() {
        "idle" => Ok(Decision::Idle),
        "move" => {
            if let Some(cell) = cell_of(&map) {
                return Ok(Decision::Move(cell));
            }
            let direction = map.get("direction").and_then(text).unwrap_or_default();
            direction_step(&direction, view.unit.team)
                .map(|(dx, dy)| Decision::Move(view.unit.position.offset(dx, dy)))
                .ok_or_else(|| {
                    BattleError::InvalidDecision(format!("move without target: {direction:?}"))
                })
        }
        "attack" => {
            let id = map.get("target_id").or_else(|| map.get("targetId"));
            if let Some(raw) = id {
                let id = number(raw)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| BattleError::InvalidDecision("bad target_id".into()))?;
                return Ok(Decision::Attack(AttackTarget::Unit(id)));
            }
            Ok(Decision::Attack(
                cell_of(&map).map_or(AttackTarget::Nearest, AttackTarget::Cell),
            ))
        }
        other => Err(BattleError::InvalidDecision(format!("unknown action {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::Terrain;
    use crate::unit::{Unit, UnitKind};

    fn units() -> Vec<Unit> {
        let make = |id, team, x, y| {
            Unit::new(
                id,
                team,
                UnitKind::Soldier,
                GridPos::new(x, y),
                UnitKind::Soldier.base_stats(),
                UnitKind::Soldier.base_capabilities(),
            )
        };
        vec![make(0, Team::A, 1, 1), make(1, Team::A, 1, 2), make(2, Team::B, 6, 1)]
    }

    fn run(source: &str, actor: usize) -> Result<Decision> {
        let terrain = TerrainGrid::flat(10, 10).with(GridPos::new(2, 1), Terrain::Forest);
        let units = units();
        let mut sandbox = ScriptSandbox::try_compile(
            units[actor].team,
            source,
            &SandboxLimits::default(),
            &terrain,
            10,
            10,
        )?;
        let view = BattleView::observe(&units, &units[actor], &terrain, 3, 10, 10);
        sandbox.decide(&view)
    }

    #[test]
    fn test_move_toward_nearest_enemy() {
        let script = r#"
            let me = state.unit;
            let target = state.enemies[0];
            if distance(me.x, me.y, target.x, target.y) <= me.range {
                return #{ action: "attack", target_id: target.id };
            }
            #{ action: "move", target: target.position }
        "#;
        assert_eq!(run(script, 0).unwrap(), Decision::Move(GridPos::new(6, 1)));
    }

    #[test]
    fn test_attack_forms() {
        assert_eq!(
            run(r#"#{ action: "attack", target_id: 2 }"#, 0).unwrap(),
            Decision::Attack(AttackTarget::Unit(2))
        );
        assert_eq!(
            run(r#"#{ action: "attack", x: 5, y: 5 }"#, 0).unwrap(),
            Decision::Attack(AttackTarget::Cell(GridPos::new(5, 5)))
        );
        assert_eq!(
            run(r#"#{ action: "attack" }"#, 0).unwrap(),
            Decision::Attack(AttackTarget::Nearest)
        );
    }

    #[test]
    fn test_directional_moves_depend_on_team() {
        let forward = r#"#{ action: "move", direction: "forward" }"#;
        assert_eq!(run(forward, 0).unwrap(), Decision::Move(GridPos::new(2, 1)));
        assert_eq!(run(forward, 2).unwrap(), Decision::Move(GridPos::new(5, 1)));
        assert_eq!(
            run(r#"#{ action: "move", direction: "up" }"#, 1).unwrap(),
            Decision::Move(GridPos::new(1, 1))
        );
    }

    #[test]
    fn test_idle_forms() {
        assert_eq!(run(r#""idle""#, 0).unwrap(), Decision::Idle);
        assert_eq!(run("", 0).unwrap(), Decision::Idle);
        assert_eq!(run(r#"#{ action: "idle" }"#, 0).unwrap(), Decision::Idle);
    }

    #[test]
    fn test_script_sees_allies_terrain_and_tick() {
        let script = r#"
            if state.allies.len() == 1 && state.terrain[1][2] == "forest"
                && terrain_at(2, 1) == "forest" && state.tick == 3 {
                "idle"
            } else {
                throw "unexpected state";
            }
        "#;
        assert_eq!(run(script, 0).unwrap(), Decision::Idle);
    }

    #[test]
    fn test_terrain_is_shared_but_not_writable() {
        let script = r#"
            if state.terrain[1][2] != "forest" || state.terrain[0][0] != "ground" {
                return #{ action: "move", x: 0, y: 0 };
            }
            let copy = state.terrain;
            copy[0][0] = "water";
            state.terrain[0][0] = "water";
            "idle"
        "#;
        let terrain = TerrainGrid::flat(10, 10).with(GridPos::new(2, 1), Terrain::Forest);
        let units = units();
        let mut sandbox = ScriptSandbox::try_compile(
            Team::A,
            script,
            &SandboxLimits::default(),
            &terrain,
            10,
            10,
        )
        .unwrap();
        for tick in 1..=3 {
            let view = BattleView::observe(&units, &units[0], &terrain, tick, 10, 10);
            assert!(!matches!(sandbox.decide(&view), Ok(Decision::Move(_))));
        }
    }

    #[test]
    fn test_distance_helper_survives_extreme_coordinates() {
        let script = r#"
            let d = distance(-9223372036854775807, 0, 9223372036854775807, 0);
            if d > 0.0 { "idle" } else { throw "bad distance"; }
        "#;
        assert_eq!(run(script, 0).unwrap(), Decision::Idle);
    }

    #[test]
    fn test_invalid_decisions() {
        assert!(matches!(
            run(r#"#{ action: "dance" }"#, 0),
            Err(BattleError::InvalidDecision(_))
        ));
        assert!(matches!(run("42", 0), Err(BattleError::InvalidDecision(_))));
        assert!(matches!(
            run(r#"#{ action: "move" }"#, 0),
            Err(BattleError::InvalidDecision(_))
        ));
    }

    #[test]
    fn test_runtime_error_is_script_failure() {
        assert!(matches!(
            run(r#"throw "boom";"#, 0),
            Err(BattleError::Script { team: Team::A, .. })
        ));
    }

    #[test]
    fn test_budget_exhaustion_is_script_failure() {
        let err = run("loop { }", 0).unwrap_err();
        assert!(matches!(err, BattleError::Script { .. }));
    }

    #[test]
    fn test_compile_failure_degrades_to_idle() {
        let terrain = TerrainGrid::default();
        let mut sandbox =
            ScriptSandbox::compile(Team::B, "let = ;", &SandboxLimits::default(), &terrain, 10, 10);
        assert!(sandbox.compile_error().is_some());

        let units = units();
        let view = BattleView::observe(&units, &units[2], &terrain, 1, 10, 10);
        assert_eq!(sandbox.decide(&view).unwrap(), Decision::Idle);
    }
}
