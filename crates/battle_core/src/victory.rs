//! Win-condition evaluation and the stalemate guard.

use serde::{Deserialize, Serialize};

use crate::math::Fixed;
use crate::unit::{Team, Unit};

/// Ticks of unchanged total health after which a match ends as a stalemate.
pub const STALEMATE_WINDOW: u32 = 50;

/// Match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    /// Team A won.
    #[serde(rename = "teamA")]
    TeamA,
    /// Team B won.
    #[serde(rename = "teamB")]
    TeamB,
    /// Nobody won.
    #[serde(rename = "draw")]
    Draw,
}

impl Winner {
    /// Winner for a team.
    #[must_use]
    pub const fn team(team: Team) -> Self {
        match team {
            Team::A => Winner::TeamA,
            Team::B => Winner::TeamB,
        }
    }

    /// Winning team, if any.
    #[must_use]
    pub const fn as_team(self) -> Option<Team> {
        match self {
            Winner::TeamA => Some(Team::A),
            Winner::TeamB => Some(Team::B),
            Winner::Draw => None,
        }
    }

    /// Stable string id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Winner::TeamA => "teamA",
            Winner::TeamB => "teamB",
            Winner::Draw => "draw",
        }
    }

    /// Strictly greater wins, equal is a draw.
    #[must_use]
    pub fn by_comparison<T: PartialOrd>(team_a: T, team_b: T) -> Self {
        if team_a > team_b {
            Winner::TeamA
        } else if team_b > team_a {
            Winner::TeamB
        } else {
            Winner::Draw
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// One or both sides were wiped out.
    Elimination,
    /// The tick budget ran out.
    TimeLimit,
    /// Total health stopped changing.
    Stalemate,
}

impl EndReason {
    /// Stable string id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            EndReason::Elimination => "elimination",
            EndReason::TimeLimit => "time_limit",
            EndReason::Stalemate => "stalemate",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Alive units per team, `[team A, team B]`.
#[must_use]
pub fn alive_counts(units: &[Unit]) -> [u32; 2] {
    let mut counts = [0u32; 2];
    for unit in units.iter().filter(|u| u.alive) {
        counts[unit.team.index()] += 1;
    }
    counts
}

/// Remaining health per team, `[team A, team B]`.
#[must_use]
pub fn health_totals(units: &[Unit]) -> [Fixed; 2] {
    let mut totals = [Fixed::ZERO; 2];
    for unit in units.iter().filter(|u| u.alive) {
        let slot = &mut totals[unit.team.index()];
        *slot = slot.saturating_add(unit.health.current);
    }
    totals
}

/// Elimination check: `Some` once at least one side has no alive units.
#[must_use]
pub fn check_elimination(alive: [u32; 2]) -> Option<Winner> {
    match alive {
        [0, 0] => Some(Winner::Draw),
        [0, _] => Some(Winner::TeamB),
        [_, 0] => Some(Winner::TeamA),
        _ => None,
    }
}

/// Winner when the tick budget runs out: more remaining health wins.
#[must_use]
pub fn time_limit_winner(health: [Fixed; 2]) -> Winner {
    Winner::by_comparison(health[0], health[1])
}

/// Winner of a stalemate: more alive units wins.
#[must_use]
pub fn stalemate_winner(alive: [u32; 2]) -> Winner {
    Winner::by_comparison(alive[0], alive[1])
}

/// Tracks how long total health has gone unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StalemateGuard {
    last_total: Option<Fixed>,
    unchanged_ticks: u32,
}

impl StalemateGuard {
    /// Fresh guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_total: None,
            unchanged_ticks: 0,
        }
    }

    /// Feed this tick's total health; true once the window is reached.
    pub fn observe(&mut self, total: Fixed) -> bool {
        if self.last_total == Some(total) {
            self.unchanged_ticks += 1;
            if self.unchanged_ticks >= STALEMATE_WINDOW {
                return true;
            }
        } else {
            self.unchanged_ticks = 0;
        }
        self.last_total = Some(total);
        false
    }

    /// Consecutive unchanged ticks so far.
    #[must_use]
    pub const fn unchanged_ticks(&self) -> u32 {
        self.unchanged_ticks
    }
}
