//! Match metrics for balance analysis.
//!
//! [`MatchMetrics`] is the per-match digest kept by batch runs (the full event
//! log is dropped); [`BatchSummary`] aggregates many of them.

use std::collections::BTreeMap;

use battle_core::report::{BattleReport, TeamStats};
use battle_core::unit::Team;
use battle_core::victory::{EndReason, Winner};
use serde::{Deserialize, Serialize};

/// Digest of one finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetrics {
    /// Position in the batch.
    pub index: u32,
    /// RNG seed used.
    pub seed: u64,
    /// Result.
    pub winner: Winner,
    /// Why it ended.
    pub end_reason: EndReason,
    /// Last tick number.
    pub total_ticks: u64,
    /// Backend that ran the match.
    pub engine_id: String,
    /// Hash of the final unit state (for determinism checks).
    pub final_hash: u64,
    /// Team A statistics.
    pub team_a: TeamStats,
    /// Team B statistics.
    pub team_b: TeamStats,
    /// Events recorded.
    pub event_count: usize,
    /// Wall-clock run time.
    pub duration_ms: u64,
}

impl MatchMetrics {
    /// Digest a report.
    #[must_use]
    pub fn from_report(index: u32, report: &BattleReport) -> Self {
        Self {
            index,
            seed: report.seed,
            winner: report.winner,
            end_reason: report.end_reason,
            total_ticks: report.total_ticks,
            engine_id: report.engine_id.clone(),
            final_hash: report.final_hash,
            team_a: report.team_a,
            team_b: report.team_b,
            event_count: report.event_count(),
            duration_ms: report.duration_ms,
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
}

/// Averages for one team across a batch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamAverages {
    /// Kills per match.
    pub kills: f64,
    /// Damage dealt per match.
    pub damage_dealt: f64,
    /// Healing per match.
    pub healing_done: f64,
    /// Survivors per match.
    pub units_remaining: f64,
    /// Script failures per match.
    pub script_failures: f64,
}

/// Aggregate statistics from a batch run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Matches completed.
    pub total_matches: u32,
    /// Wins for team A.
    pub team_a_wins: u32,
    /// Wins for team B.
    pub team_b_wins: u32,
    /// Draws.
    pub draws: u32,
    /// Team A win rate.
    pub team_a_win_rate: f64,
    /// Team B win rate.
    pub team_b_win_rate: f64,
    /// Draw rate.
    pub draw_rate: f64,
    /// Average match length in ticks.
    pub avg_ticks: f64,
    /// Shortest match.
    pub min_ticks: u64,
    /// Longest match.
    pub max_ticks: u64,
    /// Matches per end reason.
    pub end_reasons: BTreeMap<String, u32>,
    /// Matches per backend.
    pub engines: BTreeMap<String, u32>,
    /// Team A averages.
    pub team_a: TeamAverages,
    /// Team B averages.
    pub team_b: TeamAverages,
}

impl BatchSummary {
    /// Calculate summary from a list of match metrics.
    #[must_use]
    pub fn from_matches(matches: &[MatchMetrics]) -> Self {
        if matches.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_matches: matches.len() as u32,
            min_ticks: u64::MAX,
            ..Self::default()
        };

        let mut tick_sum = 0u64;
        for m in matches {
            tick_sum += m.total_ticks;
            summary.min_ticks = summary.min_ticks.min(m.total_ticks);
            summary.max_ticks = summary.max_ticks.max(m.total_ticks);

            match m.winner {
                Winner::TeamA => summary.team_a_wins += 1,
                Winner::TeamB => summary.team_b_wins += 1,
                Winner::Draw => summary.draws += 1,
            }
            *summary
                .end_reasons
                .entry(m.end_reason.id().to_string())
                .or_default() += 1;
            *summary.engines.entry(m.engine_id.clone()).or_default() += 1;
        }

        let n = matches.len() as f64;
        summary.avg_ticks = tick_sum as f64 / n;
        summary.team_a_win_rate = f64::from(summary.team_a_wins) / n;
        summary.team_b_win_rate = f64::from(summary.team_b_wins) / n;
        summary.draw_rate = f64::from(summary.draws) / n;
        summary.team_a = averages(matches, Team::A);
        summary.team_b = averages(matches, Team::B);
        summary
    }

    /// Check if the win rates are within `tolerance` of each other.
    #[must_use]
    pub fn is_balanced(&self, tolerance: f64) -> bool {
        (self.team_a_win_rate - self.team_b_win_rate).abs() <= tolerance
    }
}

fn averages(matches: &[MatchMetrics], team: Team) -> TeamAverages {
    let n = matches.len() as f64;
    let mut totals = TeamAverages::default();
    for m in matches {
        let stats = m.stats(team);
        totals.kills += f64::from(stats.kills);
        totals.damage_dealt += stats.damage_dealt.to_num::<f64>();
        totals.healing_done += stats.healing_done.to_num::<f64>();
        totals.units_remaining += f64::from(stats.units_remaining);
        totals.script_failures += f64::from(stats.script_failures);
    }
    TeamAverages {
        kills: totals.kills / n,
        damage_dealt: totals.damage_dealt / n,
        healing_done: totals.healing_done / n,
        units_remaining: totals.units_remaining / n,
        script_failures: totals.script_failures / n,
    }
}
