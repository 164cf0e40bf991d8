//! Final match results and per-team statistics.
//!
//! Both backends hand a [`MatchOutcome`] to [`BattleReport::from_outcome`], so
//! statistics are always derived the same way from the event log.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::events::{BattleEvent, TickRecord};
use crate::math::{fixed_serde, Fixed};
use crate::unit::{Team, Unit};
use crate::victory::{EndReason, Winner};

/// Raw result of a finished match, before statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Result.
    pub winner: Winner,
    /// Why it ended.
    pub end_reason: EndReason,
    /// Last tick number.
    pub total_ticks: u64,
    /// Final state of every unit, roster order.
    pub units: Vec<Unit>,
    /// Complete event log.
    pub event_log: Vec<TickRecord>,
    /// Script failures per team, `[team A, team B]`.
    pub script_failures: [u32; 2],
    /// RNG seed used.
    pub seed: u64,
}

/// Aggregate statistics for one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamStats {
    /// Enemy units killed.
    pub kills: u32,
    /// Damage dealt, as recorded on attack events.
    #[serde(with = "fixed_serde")]
    pub damage_dealt: Fixed,
    /// Damage received.
    #[serde(with = "fixed_serde")]
    pub damage_taken: Fixed,
    /// Health restored by healers.
    #[serde(with = "fixed_serde")]
    pub healing_done: Fixed,
    /// Attacks that landed.
    pub attacks: u32,
    /// Critical hits.
    pub critical_hits: u32,
    /// Cells changed.
    pub moves: u32,
    /// Own units killed.
    pub units_lost: u32,
    /// Own units alive at the end.
    pub units_remaining: u32,
    /// Remaining health at the end.
    #[serde(with = "fixed_serde")]
    pub final_health: Fixed,
    /// Script invocations that failed.
    pub script_failures: u32,
}

impl TeamStats {
    /// Derive statistics for `team` from final units and the event log.
    #[must_use]
    pub fn collect(team: Team, units: &[Unit], log: &[TickRecord], script_failures: u32) -> Self {
        let team_of = |id| units.iter().find(|u| u.id == id).map(|u| u.team);
        let mut stats = Self {
            script_failures,
            ..Self::default()
        };

        for event in log.iter().flat_map(|record| &record.events) {
            match *event {
                BattleEvent::Move { unit, .. } => {
                    if team_of(unit) == Some(team) {
                        stats.moves += 1;
                    }
                }
                BattleEvent::Attack {
                    attacker,
                    damage,
                    critical,
                    killed,
                    ..
                } if team_of(attacker) == Some(team) => {
                    stats.attacks += 1;
                    stats.damage_dealt = stats.damage_dealt.saturating_add(damage);
                    stats.critical_hits += u32::from(critical);
                    stats.kills += u32::from(killed);
                }
                BattleEvent::Attack { target, damage, .. } => {
                    if team_of(target) == Some(team) {
                        stats.damage_taken = stats.damage_taken.saturating_add(damage);
                    }
                }
                BattleEvent::Heal { healer, amount, .. } => {
                    if team_of(healer) == Some(team) {
                        stats.healing_done = stats.healing_done.saturating_add(amount);
                    }
                }
            }
        }

        for unit in units.iter().filter(|u| u.team == team) {
            if unit.alive {
                stats.units_remaining += 1;
                stats.final_health = stats.final_health.saturating_add(unit.health.current);
            } else {
                stats.units_lost += 1;
            }
        }
        stats
    }
}

/// Everything a match produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Result.
    pub winner: Winner,
    /// Last tick number.
    pub total_ticks: u64,
    /// Why it ended.
    pub end_reason: EndReason,
    /// Team A statistics.
    pub team_a: TeamStats,
    /// Team B statistics.
    pub team_b: TeamStats,
    /// Final state of every unit.
    pub units: Vec<Unit>,
    /// Complete event log.
    pub event_log: Vec<TickRecord>,
    /// Backend that ran the match.
    pub engine_id: String,
    /// RNG seed used.
    pub seed: u64,
    /// Hash of the final unit state.
    pub final_hash: u64,
    /// Wall-clock run time; informational only.
    pub duration_ms: u64,
}

impl BattleReport {
    /// Build a report from a finished match.
    #[must_use]
    pub fn from_outcome(outcome: MatchOutcome, engine_id: &str, duration_ms: u64) -> Self {
        let team_a = TeamStats::collect(
            Team::A,
            &outcome.units,
            &outcome.event_log,
            outcome.script_failures[0],
        );
        let team_b = TeamStats::collect(
            Team::B,
            &outcome.units,
            &outcome.event_log,
            outcome.script_failures[1],
        );
        Self {
            winner: outcome.winner,
            total_ticks: outcome.total_ticks,
            end_reason: outcome.end_reason,
            team_a,
            team_b,
            final_hash: units_hash(&outcome.units),
            units: outcome.units,
            event_log: outcome.event_log,
            engine_id: engine_id.to_string(),
            seed: outcome.seed,
            duration_ms,
        }
    }

    /// Statistics for one team.
    #[must_use]
    pub const fn stats(&self, team: Team) -> &TeamStats {
        match team {
            Team::A => &self.team_a,
            Team::B => &self.team_b,
        }
    }

    /// Total number of events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.event_log.iter().map(|r| r.events.len()).sum()
    }

    /// True if two reports describe the same match, ignoring backend id and
    /// timing.
    #[must_use]
    pub fn same_outcome(&self, other: &Self) -> bool {
        self.winner == other.winner
            && self.total_ticks == other.total_ticks
            && self.end_reason == other.end_reason
            && self.units == other.units
            && self.event_log == other.event_log
            && self.team_a == other.team_a
            && self.team_b == other.team_b
    }
}

/// Hash of the observable unit state: id, position, health, alive.
///
/// Cooldowns are excluded so the hash can be recomputed from a replay.
#[must_use]
pub fn units_hash(units: &[Unit]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for unit in units {
        unit.id.hash(&mut hasher);
        unit.position.hash(&mut hasher);
        unit.health.current.to_bits().hash(&mut hasher);
        unit.alive.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::GridPos;
    use crate::unit::UnitKind;

    fn units() -> Vec<Unit> {
        let roster = [
            (0, Team::A, UnitKind::Medic),
            (1, Team::A, UnitKind::Soldier),
            (2, Team::B, UnitKind::Soldier),
        ];
        let mut units: Vec<Unit> = roster
            .into_iter()
            .map(|(id, team, kind)| {
                Unit::new(
                    id,
                    team,
                    kind,
                    GridPos::new(id as i32, 0),
                    kind.base_stats(),
                    kind.base_capabilities(),
                )
            })
            .collect();
        units[2].take_damage(Fixed::from_num(500));
        units
    }

    fn log() -> Vec<TickRecord> {
        vec![
            TickRecord {
                tick: 1,
                events: vec![
                    BattleEvent::Move {
                        unit: 1,
                        from: GridPos::new(1, 0),
                        to: GridPos::new(1, 1),
                    },
                    BattleEvent::Attack {
                        attacker: 2,
                        target: 1,
                        damage: Fixed::from_num(13),
                        critical: false,
                        killed: false,
                    },
                ],
            },
            TickRecord {
                tick: 2,
                events: vec![
                    BattleEvent::Heal {
                        healer: 0,
                        target: 1,
                        amount: Fixed::from_num(13),
                    },
                    BattleEvent::Attack {
                        attacker: 1,
                        target: 2,
                        damage: Fixed::from_num(26),
                        critical: true,
                        killed: true,
                    },
                ],
            },
        ]
    }

    #[test]
    fn test_team_stats_from_log() {
        let units = units();
        let a = TeamStats::collect(Team::A, &units, &log(), 0);
        assert_eq!(a.kills, 1);
        assert_eq!(a.critical_hits, 1);
        assert_eq!(a.damage_dealt, Fixed::from_num(26));
        assert_eq!(a.damage_taken, Fixed::from_num(13));
        assert_eq!(a.healing_done, Fixed::from_num(13));
        assert_eq!(a.moves, 1);
        assert_eq!(a.units_remaining, 2);
        assert_eq!(a.final_health, Fixed::from_num(170));

        let b = TeamStats::collect(Team::B, &units, &log(), 4);
        assert_eq!(b.units_lost, 1);
        assert_eq!(b.units_remaining, 0);
        assert_eq!(b.script_failures, 4);
        assert_eq!(b.damage_taken, Fixed::from_num(26));
    }

    #[test]
    fn test_report_from_outcome() {
        let outcome = MatchOutcome {
            winner: Winner::TeamA,
            end_reason: EndReason::Elimination,
            total_ticks: 3,
            units: units(),
            event_log: log(),
            script_failures: [0, 0],
            seed: 11,
        };
        let report = BattleReport::from_outcome(outcome, "reference", 5);
        assert_eq!(report.event_count(), 4);
        assert_eq!(report.final_hash, units_hash(&report.units));
        assert_eq!(report.stats(Team::A).kills, 1);

        let mut other = report.clone();
        other.engine_id = "native".into();
        other.duration_ms = 99;
        assert!(report.same_outcome(&other));
    }
}
