//! Library of decision scripts.
//!
//! A strategy is a named Rhai script. Scenarios refer to built-ins by name,
//! and the `strategies` subcommand lists or prints them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for strategy operations.
#[derive(Error, Debug)]
pub enum StrategyError {
    /// File not found.
    #[error("Strategy file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read strategy file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse strategy: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// No built-in with this name.
    #[error("Unknown strategy: {0}")]
    Unknown(String),
}

/// A named decision script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Strategy name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Rhai source.
    pub script: String,
}

const CHASE: &str = r#"
let me = state.unit;
if state.enemies.len() == 0 {
    return "idle";
}
let best = state.enemies[0];
let best_d = distance(me.x, me.y, best.x, best.y);
for foe in state.enemies {
    let d = distance(me.x, me.y, foe.x, foe.y);
    if d < best_d {
        best = foe;
        best_d = d;
    }
}
if best_d <= me.range {
    return #{ action: "attack", target_id: best.id };
}
#{ action: "move", target: best.position }
"#;

const HOLD: &str = r#"
let me = state.unit;
for foe in state.enemies {
    if distance(me.x, me.y, foe.x, foe.y) <= me.range {
        return #{ action: "attack", target_id: foe.id };
    }
}
"idle"
"#;

const ADVANCE: &str = r#"
let me = state.unit;
for foe in state.enemies {
    if distance(me.x, me.y, foe.x, foe.y) <= me.range {
        return #{ action: "attack" };
    }
}
#{ action: "move", direction: "forward" }
"#;

const FOCUS: &str = r#"
let me = state.unit;
let found = false;
let target = #{};
for foe in state.enemies {
    if distance(me.x, me.y, foe.x, foe.y) <= me.range {
        if !found || foe.health < target.health {
            target = foe;
            found = true;
        }
    }
}
if found {
    return #{ action: "attack", target_id: target.id };
}
if state.enemies.len() == 0 {
    return "idle";
}
let weakest = state.enemies[0];
for foe in state.enemies {
    if foe.health < weakest.health {
        weakest = foe;
    }
}
#{ action: "move", target: weakest.position }
"#;

const KITE: &str = r#"
let me = state.unit;
if state.enemies.len() == 0 {
    return "idle";
}
let best = state.enemies[0];
let best_d = distance(me.x, me.y, best.x, best.y);
for foe in state.enemies {
    let d = distance(me.x, me.y, foe.x, foe.y);
    if d < best_d {
        best = foe;
        best_d = d;
    }
}
if best_d < 2.0 && me.range > 2.0 {
    let away = if best.x > me.x { "left" } else { "right" };
    return #{ action: "move", direction: away };
}
if best_d <= me.range {
    return #{ action: "attack", target_id: best.id };
}
#{ action: "move", target: best.position }
"#;

impl Strategy {
    /// Build a strategy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            script: script.into(),
        }
    }

    /// Close on the nearest enemy and attack it once in range.
    #[must_use]
    pub fn chase() -> Self {
        Self::new("chase", "Close on the nearest enemy and attack it", CHASE)
    }

    /// Never move; attack anything that comes into range.
    #[must_use]
    pub fn hold() -> Self {
        Self::new("hold", "Hold position and fire on anything in range", HOLD)
    }

    /// March forward until something is in range.
    #[must_use]
    pub fn advance() -> Self {
        Self::new("advance", "March toward the enemy side, attack when in range", ADVANCE)
    }

    /// Attack the weakest enemy in range, or walk toward the weakest overall.
    #[must_use]
    pub fn focus() -> Self {
        Self::new("focus", "Focus fire on the weakest enemy", FOCUS)
    }

    /// Ranged units step away from adjacent enemies before shooting.
    #[must_use]
    pub fn kite() -> Self {
        Self::new("kite", "Keep ranged units out of melee reach", KITE)
    }

    /// Do nothing.
    #[must_use]
    pub fn idle() -> Self {
        Self::new("idle", "Every unit idles", "()")
    }

    /// All built-in strategies.
    #[must_use]
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::chase(),
            Self::hold(),
            Self::advance(),
            Self::focus(),
            Self::kite(),
            Self::idle(),
        ]
    }

    /// Look up a built-in strategy by name.
    pub fn by_name(name: &str) -> Result<Self, StrategyError> {
        Self::builtins()
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StrategyError::Unknown(name.to_string()))
    }

    /// Load a strategy from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StrategyError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StrategyError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, StrategyError> {
        let strategy: Strategy = ron::from_str(ron)?;
        Ok(strategy)
    }

    /// A built-in by name, or a RON file path.
    pub fn resolve(name_or_path: &str) -> Result<Self, StrategyError> {
        match Self::by_name(name_or_path) {
            Ok(strategy) => Ok(strategy),
            Err(_) => Self::load(name_or_path),
        }
    }
}
