//! Fixed-point math utilities for deterministic simulation.
//!
//! Stats, health and damage use fixed-point arithmetic so that the reference
//! engine and the native kernel produce bit-identical results. Positions live
//! on an integer grid ([`GridPos`]).

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// A cell coordinate on the battle grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance, exact for integer cells.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = i64::from(other.x) - i64::from(self.x);
        let dy = i64::from(other.y) - i64::from(self.y);
        Fixed::saturating_from_num(dx * dx + dy * dy)
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// True if `other` is within `range` cells (inclusive).
    #[must_use]
    pub fn within(self, other: Self, range: Fixed) -> bool {
        if range < Fixed::ZERO {
            return false;
        }
        self.distance_squared(other) <= range.saturating_mul(range)
    }

    /// Clamp into `[0, width) x [0, height)`.
    #[must_use]
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let max_x = i32::try_from(width.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height.saturating_sub(1)).unwrap_or(i32::MAX);
        Self {
            x: self.x.clamp(0, max_x),
            y: self.y.clamp(0, max_y),
        }
    }

    /// Offset by a delta.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X component.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y component.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Binary formats (bincode replays, the native bridge) carry the raw bit
/// representation so values survive exactly. Human-readable formats (RON,
/// JSON scenario files and reports) use plain decimal numbers.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            value.to_num::<f64>().serialize(serializer)
        } else {
            value.to_bits().serialize(serializer)
        }
    }

    /// Deserialize a fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let value = f64::deserialize(deserializer)?;
            if !value.is_finite() {
                return Err(serde::de::Error::custom("non-finite number"));
            }
            Ok(Fixed::saturating_from_num(value))
        } else {
            Ok(Fixed::from_bits(i64::deserialize(deserializer)?))
        }
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Vector from one cell to another.
    #[must_use]
    pub fn between(from: GridPos, to: GridPos) -> Self {
        Self::new(
            Fixed::saturating_from_num(i64::from(to.x) - i64::from(from.x)),
            Fixed::saturating_from_num(i64::from(to.y) - i64::from(from.y)),
        )
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x.saturating_mul(factor), self.y.saturating_mul(factor))
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let one = Fixed::from_num(1);
    let mut high = if value > one { value } else { one };

    for _ in 0..48 {
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Round half up: `floor(v + 1/2)`.
#[must_use]
pub fn round_half_up(value: Fixed) -> i32 {
    let rounded = value.saturating_add(Fixed::from_num(0.5)).floor();
    rounded.saturating_to_num::<i32>()
}
