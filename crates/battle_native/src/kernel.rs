//! Structure-of-arrays battle kernel.
//!
//! Unit state lives in parallel arrays indexed by roster position, and an
//! occupancy grid answers "who stands here" in O(1). The tick order, target
//! rules and arithmetic are those of the reference scheduler; the kernel only
//! changes how state is laid out and looked up.

use battle_core::abilities::heal_cooldown;
use battle_core::combat::{attack_cooldown, calculate_damage, roll_critical};
use battle_core::decision::{AttackTarget, BattleView, ContactView, Decision, SelfView};
use battle_core::error::BattleError;
use battle_core::events::{BattleEvent, TickRecord};
use battle_core::math::{Fixed, GridPos};
use battle_core::movement::{effective_speed, step_toward};
use battle_core::terrain::{Terrain, TerrainGrid, TerrainModifier};
use battle_core::unit::{Capabilities, Health, Team, Unit, UnitKind};
use battle_core::victory::{
    check_elimination, stalemate_winner, time_limit_winner, EndReason, StalemateGuard, Winner,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::bridge::{KernelHost, KernelResult};
use crate::error::KernelError;
use crate::layout::KernelConfig;

const EMPTY: u32 = u32::MAX;

/// One match in flat form.
pub struct Kernel {
    width: u32,
    height: u32,
    max_ticks: u32,
    seed: u64,
    terrain: TerrainGrid,
    cell_terrain: Vec<Terrain>,
    occupancy: Vec<u32>,

    teams: Vec<Team>,
    kinds: Vec<UnitKind>,
    xs: Vec<i32>,
    ys: Vec<i32>,
    health: Vec<Health>,
    attack: Vec<Fixed>,
    defense: Vec<Fixed>,
    speed: Vec<Fixed>,
    range: Vec<Fixed>,
    cooldown: Vec<u32>,
    alive: Vec<bool>,
    caps: Vec<Capabilities>,

    tick: u64,
    rng: ChaCha8Rng,
    stalemate: StalemateGuard,
    history: Vec<TickRecord>,
    script_failures: [u32; 2],
}

impl Kernel {
    /// Unpack a layout into kernel arrays.
    pub fn new(layout: &KernelConfig, script_failures: [u32; 2]) -> Result<Self, KernelError> {
        let config = layout.to_config()?;
        let count = layout.unit_count();
        let (width, height) = (layout.width, layout.height);

        let mut cell_terrain = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                cell_terrain.push(config.terrain.at(GridPos::new(x, y)));
            }
        }

        let mut kernel = Self {
            width,
            height,
            max_ticks: layout.max_ticks,
            seed: layout.seed,
            terrain: config.terrain.clone(),
            cell_terrain,
            occupancy: vec![EMPTY; width as usize * height as usize],
            teams: Vec::with_capacity(count),
            kinds: Vec::with_capacity(count),
            xs: Vec::with_capacity(count),
            ys: Vec::with_capacity(count),
            health: Vec::with_capacity(count),
            attack: Vec::with_capacity(count),
            defense: Vec::with_capacity(count),
            speed: Vec::with_capacity(count),
            range: Vec::with_capacity(count),
            cooldown: Vec::with_capacity(count),
            alive: Vec::with_capacity(count),
            caps: Vec::with_capacity(count),
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(layout.seed),
            stalemate: StalemateGuard::new(),
            history: Vec::new(),
            script_failures,
        };

        for unit in config.build_units() {
            let index = kernel.teams.len();
            let cell = kernel.cell(unit.position.x, unit.position.y);
            if unit.alive {
                if kernel.occupancy[cell] != EMPTY {
                    return Err(KernelError::Rejected(format!(
                        "units {} and {index} start on the same cell",
                        kernel.occupancy[cell]
                    )));
                }
                kernel.occupancy[cell] = index as u32;
            }
            kernel.teams.push(unit.team);
            kernel.kinds.push(unit.kind);
            kernel.xs.push(unit.position.x);
            kernel.ys.push(unit.position.y);
            kernel.health.push(unit.health);
            kernel.attack.push(unit.attack);
            kernel.defense.push(unit.defense);
            kernel.speed.push(unit.speed);
            kernel.range.push(unit.range);
            kernel.cooldown.push(unit.cooldown);
            kernel.alive.push(unit.alive);
            kernel.caps.push(unit.capabilities);
        }
        Ok(kernel)
    }

    fn cell(&self, x: i32, y: i32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn position(&self, i: usize) -> GridPos {
        GridPos::new(self.xs[i], self.ys[i])
    }

    fn modifier(&self, pos: GridPos) -> TerrainModifier {
        self.cell_terrain[self.cell(pos.x, pos.y)].modifier()
    }

    fn len(&self) -> usize {
        self.teams.len()
    }

    /// Run to completion, reporting through `host`.
    pub fn run(mut self, host: &mut dyn KernelHost) -> KernelResult {
        info!(
            units = self.len(),
            max_ticks = self.max_ticks,
            seed = self.seed,
            "kernel match started"
        );
        loop {
            if let Some((winner, end_reason)) = self.step(host) {
                info!(tick = self.tick, %winner, %end_reason, "kernel match finished");
                return KernelResult {
                    winner,
                    end_reason,
                    total_ticks: self.tick,
                    xs: self.xs,
                    ys: self.ys,
                    health: self.health.iter().map(|h| h.current.to_bits()).collect(),
                    cooldown: self.cooldown,
                    alive: self.alive,
                    event_log: self.history,
                    script_failures: self.script_failures,
                };
            }
        }
    }

    /// One tick; `Some` once the match is over.
    fn step(&mut self, host: &mut dyn KernelHost) -> Option<(Winner, EndReason)> {
        self.tick += 1;

        let mut alive = [0u32; 2];
        let mut totals = [Fixed::ZERO; 2];
        for i in (0..self.len()).filter(|&i| self.alive[i]) {
            let team = self.teams[i].index();
            alive[team] += 1;
            totals[team] = totals[team].saturating_add(self.health[i].current);
        }
        if let Some(winner) = check_elimination(alive) {
            return Some((winner, EndReason::Elimination));
        }
        if self.tick >= u64::from(self.max_ticks) {
            return Some((time_limit_winner(totals), EndReason::TimeLimit));
        }
        if self.stalemate.observe(totals[0].saturating_add(totals[1])) {
            return Some((stalemate_winner(alive), EndReason::Stalemate));
        }

        let record = self.unit_turns(host);
        for cooldown in &mut self.cooldown {
            *cooldown = cooldown.saturating_sub(1);
        }
        host.on_tick(&record, &self.units());
        self.history.push(record);
        None
    }

    fn unit_turns(&mut self, host: &mut dyn KernelHost) -> TickRecord {
        let mut record = TickRecord::new(self.tick);
        let snapshot = Snapshot {
            xs: self.xs.clone(),
            ys: self.ys.clone(),
            health: self.health.clone(),
            alive: self.alive.clone(),
        };

        for i in 0..self.len() {
            if !snapshot.alive[i] || !self.alive[i] || self.cooldown[i] > 0 {
                continue;
            }
            if self.caps[i].heal.is_some() {
                record.events.extend(self.heal(i));
                continue;
            }

            let team = self.teams[i];
            let decision = {
                let view = self.view(&snapshot, i);
                match host.decide(team, &view) {
                    Ok(decision) => decision,
                    Err(BattleError::InvalidDecision(reason)) => {
                        debug!(%team, unit = i, %reason, "invalid decision, idling");
                        Decision::Idle
                    }
                    Err(err) => {
                        let failures = &mut self.script_failures[team.index()];
                        *failures += 1;
                        if *failures == 1 {
                            warn!(%team, unit = i, error = %err, "script failed, idling");
                        } else {
                            debug!(%team, unit = i, error = %err, "script failed, idling");
                        }
                        Decision::Idle
                    }
                }
            };

            let event = match decision {
                Decision::Idle => None,
                Decision::Move(target) => self.move_unit(i, target),
                Decision::Attack(target) => self.attack(i, target),
            };
            record.events.extend(event);
        }
        record
    }

    fn view<'a>(&'a self, snapshot: &Snapshot, actor: usize) -> BattleView<'a> {
        let team = self.teams[actor];
        let mut enemies = Vec::new();
        let mut allies = Vec::new();
        for j in (0..self.len()).filter(|&j| j != actor && snapshot.alive[j]) {
            let contact = ContactView {
                id: j as u32,
                position: GridPos::new(snapshot.xs[j], snapshot.ys[j]),
                health: snapshot.health[j].current,
                kind: self.kinds[j],
            };
            if self.teams[j] == team {
                allies.push(contact);
            } else {
                enemies.push(contact);
            }
        }
        BattleView {
            unit: SelfView {
                id: actor as u32,
                team,
                kind: self.kinds[actor],
                position: GridPos::new(snapshot.xs[actor], snapshot.ys[actor]),
                health: snapshot.health[actor].current,
                max_health: snapshot.health[actor].max,
                attack: self.attack[actor],
                defense: self.defense[actor],
                speed: self.speed[actor],
                range: self.range[actor],
            },
            enemies,
            allies,
            terrain: &self.terrain,
            tick: self.tick,
            grid_width: self.width,
            grid_height: self.height,
        }
    }

    fn heal(&mut self, i: usize) -> Option<BattleEvent> {
        let heal = self.caps[i].heal?;
        let from = self.position(i);
        let mut best = None;
        let mut best_ratio = Fixed::from_num(1);
        for j in 0..self.len() {
            if j == i || !self.alive[j] || self.teams[j] != self.teams[i] {
                continue;
            }
            if !self.health[j].is_injured() || !from.within(self.position(j), heal.range) {
                continue;
            }
            let ratio = self.health[j].ratio();
            if ratio < best_ratio {
                best_ratio = ratio;
                best = Some(j);
            }
        }
        let target = best?;
        let amount = self.health[target].heal(heal.amount);
        self.cooldown[i] = heal_cooldown(&heal);
        Some(BattleEvent::Heal {
            healer: i as u32,
            target: target as u32,
            amount,
        })
    }

    fn move_unit(&mut self, i: usize, target: GridPos) -> Option<BattleEvent> {
        let from = self.position(i);
        let speed = effective_speed(
            self.speed[i],
            self.modifier(from),
            self.caps[i].terrain_immunity,
        );
        let to = step_toward(from, target, speed, self.width, self.height);
        if to == from {
            return None;
        }
        let dest = self.cell(to.x, to.y);
        if self.occupancy[dest] != EMPTY {
            return None;
        }
        let src = self.cell(from.x, from.y);
        self.occupancy[src] = EMPTY;
        self.occupancy[dest] = i as u32;
        self.xs[i] = to.x;
        self.ys[i] = to.y;
        Some(BattleEvent::Move {
            unit: i as u32,
            from,
            to,
        })
    }

    fn closest_enemy(&self, i: usize, point: GridPos) -> Option<usize> {
        let mut best: Option<(usize, Fixed)> = None;
        for j in 0..self.len() {
            if !self.alive[j] || self.teams[j] == self.teams[i] {
                continue;
            }
            let dist = point.distance_squared(self.position(j));
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((j, dist));
            }
        }
        best.map(|(j, _)| j)
    }

    fn attack(&mut self, i: usize, target: AttackTarget) -> Option<BattleEvent> {
        let defender = match target {
            AttackTarget::Unit(id) => {
                let j = usize::try_from(id).ok().filter(|&j| j < self.len())?;
                (self.alive[j] && self.teams[j] != self.teams[i]).then_some(j)
            }
            AttackTarget::Cell(cell) => self.closest_enemy(i, cell),
            AttackTarget::Nearest => self.closest_enemy(i, self.position(i)),
        }?;
        let at = self.position(defender);
        if !self.position(i).within(at, self.range[i]) {
            return None;
        }

        let critical = roll_critical(&mut self.rng, self.caps[i].critical);
        let damage = calculate_damage(
            self.attack[i],
            self.defense[defender],
            self.modifier(at).defense_bonus,
            critical,
        );
        let dealt = self.health[defender].apply_damage(damage);
        let killed = self.health[defender].is_depleted();
        if killed {
            self.health[defender].current = Fixed::ZERO;
            self.alive[defender] = false;
            let cell = self.cell(at.x, at.y);
            self.occupancy[cell] = EMPTY;
        }
        self.cooldown[i] = attack_cooldown(&self.caps[i]);

        Some(BattleEvent::Attack {
            attacker: i as u32,
            target: defender as u32,
            damage: dealt,
            critical,
            killed,
        })
    }

    /// Materialize unit records.
    pub fn units(&self) -> Vec<Unit> {
        (0..self.len())
            .map(|i| Unit {
                id: i as u32,
                team: self.teams[i],
                kind: self.kinds[i],
                position: self.position(i),
                health: self.health[i],
                attack: self.attack[i],
                defense: self.defense[i],
                speed: self.speed[i],
                range: self.range[i],
                cooldown: self.cooldown[i],
                alive: self.alive[i],
                capabilities: self.caps[i],
            })
            .collect()
    }
}

/// Tick-start state read by decisions.
struct Snapshot {
    xs: Vec<i32>,
    ys: Vec<i32>,
    health: Vec<Health>,
    alive: Vec<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::config::{SimulationConfig, TeamConfig, UnitTemplate};
    use battle_core::error::Result;

    struct Scripted(fn(Team) -> Result<Decision>, Vec<u64>);

    impl KernelHost for Scripted {
        fn decide(&mut self, team: Team, _view: &BattleView<'_>) -> Result<Decision> {
            (self.0)(team)
        }

        fn on_tick(&mut self, record: &TickRecord, _units: &[Unit]) {
            self.1.push(record.tick);
        }
    }

    fn layout(a: (i32, i32), b: (i32, i32)) -> KernelConfig {
        let config = SimulationConfig::new(10, 10)
            .with_team(
                Team::A,
                TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, a.0, a.1)], ""),
            )
            .with_team(
                Team::B,
                TeamConfig::new(vec![UnitTemplate::new(UnitKind::Soldier, b.0, b.1)], ""),
            );
        KernelConfig::from_config(&config).unwrap()
    }

    #[test]
    fn test_occupancy_tracks_moves_and_deaths() {
        let mut kernel = Kernel::new(&layout((0, 0), (3, 0)), [0, 0]).unwrap();
        assert_eq!(kernel.occupancy[kernel.cell(3, 0)], 1);

        // The step lands on (3, 0), held by the live enemy.
        assert!(kernel.move_unit(0, GridPos::new(5, 0)).is_none());
        assert_eq!(kernel.occupancy[kernel.cell(0, 0)], 0);

        kernel.range[0] = Fixed::from_num(3);
        kernel.health[1].current = Fixed::from_num(1);
        let event = kernel.attack(0, AttackTarget::Nearest);
        assert!(matches!(event, Some(BattleEvent::Attack { killed: true, .. })));
        assert_eq!(kernel.occupancy[kernel.cell(3, 0)], EMPTY);

        kernel.cooldown[0] = 0;
        let event = kernel.move_unit(0, GridPos::new(5, 0));
        assert_eq!(
            event,
            Some(BattleEvent::Move {
                unit: 0,
                from: GridPos::new(0, 0),
                to: GridPos::new(3, 0),
            })
        );
        assert_eq!(kernel.occupancy[kernel.cell(0, 0)], EMPTY);
        assert_eq!(kernel.occupancy[kernel.cell(3, 0)], 0);
    }

    #[test]
    fn test_unit_target_must_be_alive_enemy() {
        let mut kernel = Kernel::new(&layout((0, 0), (1, 0)), [0, 0]).unwrap();
        assert!(kernel.attack(0, AttackTarget::Unit(0)).is_none());
        assert!(kernel.attack(0, AttackTarget::Unit(7)).is_none());
        assert!(kernel.attack(0, AttackTarget::Unit(1)).is_some());
    }

    #[test]
    fn test_failures_count_from_initial_value() {
        let mut flat = layout((0, 0), (9, 9));
        flat.max_ticks = 4;
        let kernel = Kernel::new(&flat, [1, 0]).unwrap();
        let mut host = Scripted(
            |team| match team {
                Team::A => Err(BattleError::Script {
                    team,
                    message: "boom".into(),
                }),
                Team::B => Err(BattleError::InvalidDecision("nope".into())),
            },
            Vec::new(),
        );
        let result = kernel.run(&mut host);
        assert_eq!(result.total_ticks, 4);
        assert_eq!(result.end_reason, EndReason::TimeLimit);
        // Compile failure plus three failing turns; invalid decisions are not counted.
        assert_eq!(result.script_failures, [4, 0]);
        assert_eq!(host.1, vec![1, 2, 3]);
    }
}
