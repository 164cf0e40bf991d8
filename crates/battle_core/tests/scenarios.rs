//! End-to-end battle scenarios on the reference engine.

use battle_core::events::{BattleEvent, NullObserver, TickRecord};
use battle_core::math::{Fixed, GridPos};
use battle_core::report::TeamStats;
use battle_core::simulation::Simulation;
use battle_core::unit::{Team, Unit, UnitKind};
use battle_core::victory::{EndReason, Winner};
use battle_test_utils::fixtures::{
    battle_config, broken_script_config, duel_config, healer_config, terrain_crossing_config,
};

#[test]
fn test_duel_first_mover_wins() {
    let mut sim = Simulation::new(duel_config()).unwrap();
    let outcome = sim.run(&mut NullObserver);

    assert_eq!(outcome.winner, Winner::TeamA);
    assert_eq!(outcome.end_reason, EndReason::Elimination);
    assert_eq!(outcome.total_ticks, 17);

    let attacks: Vec<(u64, u32, bool)> = outcome
        .event_log
        .iter()
        .flat_map(|r| r.events.iter().map(move |e| (r.tick, e)))
        .filter_map(|(tick, e)| match *e {
            BattleEvent::Attack { attacker, killed, .. } => Some((tick, attacker, killed)),
            _ => None,
        })
        .collect();
    // Both sides hit on even ticks; A's eighth hit kills before B's lands.
    assert_eq!(attacks.len(), 15);
    assert_eq!(attacks.last(), Some(&(16, 0, true)));
    assert!(attacks.iter().all(|&(tick, _, _)| tick % 2 == 0));

    let survivor = &outcome.units[0];
    assert!(survivor.alive);
    assert!(survivor.health.current < survivor.health.max);
}

#[test]
fn test_healer_restores_ally() {
    let mut heals: Vec<u64> = Vec::new();
    let mut soldier_health = Vec::new();
    let mut sim = Simulation::new(healer_config()).unwrap();
    let outcome = sim.run(&mut |record: &TickRecord, units: &[Unit]| {
        for event in &record.events {
            if let BattleEvent::Heal { healer, target, .. } = *event {
                assert_eq!((healer, target), (0, 1));
                heals.push(record.tick);
            }
        }
        soldier_health.push(units[1].health.current);
    });

    // One heal per cooldown window while the ally is hurt.
    assert_eq!(heals, vec![2, 5, 8]);
    let soldier = &outcome.units[1];
    assert_eq!(soldier.health.current, soldier.health.max);
    assert!(soldier_health[2] < soldier_health[4]);

    // The medic never came under fire.
    let medic = &outcome.units[0];
    assert_eq!(medic.health.current, medic.health.max);
    assert_eq!(medic.position, GridPos::new(3, 5));

    assert_eq!(outcome.end_reason, EndReason::Stalemate);
    assert_eq!(outcome.winner, Winner::TeamA);
}

#[test]
fn test_terrain_immunity_keeps_full_speed() {
    let mut sim = Simulation::new(terrain_crossing_config()).unwrap();
    sim.initialize();
    for _ in 0..3 {
        sim.tick();
    }

    let immune = &sim.units()[0];
    let slowed = &sim.units()[1];
    assert_eq!(immune.position, GridPos::new(15, 0));
    // Forest halves speed: 2.5 rounds up to 3 cells a tick.
    assert_eq!(slowed.position, GridPos::new(9, 2));
}

#[test]
fn test_throwing_script_idles_team() {
    let mut sim = Simulation::new(broken_script_config()).unwrap();
    let outcome = sim.run(&mut NullObserver);

    let team_b: Vec<u32> = outcome
        .units
        .iter()
        .filter(|u| u.team == Team::B)
        .map(|u| u.id)
        .collect();
    let b_acted = outcome
        .event_log
        .iter()
        .flat_map(|r| &r.events)
        .any(|e| team_b.contains(&e.actor()));
    assert!(!b_acted);

    assert_eq!(outcome.winner, Winner::TeamA);
    assert_eq!(outcome.end_reason, EndReason::Elimination);
    assert_eq!(outcome.script_failures[0], 0);
    assert!(outcome.script_failures[1] > 0);
    assert!(outcome.total_ticks > 1);
}

#[test]
fn test_far_move_targets_stay_on_grid() {
    let config = battle_config(
        10,
        10,
        (&[(UnitKind::Soldier, 1, 1)], r#"#{ action: "move", x: 100000, y: 100000 }"#),
        (&[(UnitKind::Soldier, 5, 1)], r#"#{ action: "move", x: -3000000000, y: 0 }"#),
    )
    .with_max_ticks(30);
    let mut sim = Simulation::new(config).unwrap();
    let outcome = sim.run(&mut NullObserver);

    assert_eq!(outcome.end_reason, EndReason::TimeLimit);
    assert_eq!(outcome.total_ticks, 30);
    assert_eq!(outcome.script_failures, [0, 0]);
    assert_eq!(outcome.units[0].position, GridPos::new(9, 9));
    assert_eq!(outcome.units[1].position, GridPos::new(0, 0));
}

#[test]
fn test_overkill_is_not_counted_as_damage() {
    let mut sim = Simulation::new(duel_config()).unwrap();
    let outcome = sim.run(&mut NullObserver);

    let a = TeamStats::collect(Team::A, &outcome.units, &outcome.event_log, 0);
    let b = TeamStats::collect(Team::B, &outcome.units, &outcome.event_log, 0);
    let soldier = Fixed::from_num(100);
    assert_eq!(a.damage_dealt, soldier);
    assert_eq!(b.damage_taken, soldier);
    assert_eq!(a.damage_taken, soldier - outcome.units[0].health.current);
}
