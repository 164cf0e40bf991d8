//! Kernel error types.

use battle_core::error::BattleError;
use thiserror::Error;

use crate::NativeBackend;

/// Reasons the native kernel cannot run a match.
#[derive(Debug, Error)]
pub enum KernelError {
    /// More units than the kernel's arrays are sized for.
    #[error("{count} units exceeds the kernel limit of {limit}")]
    TooManyUnits {
        /// Units in the config.
        count: usize,
        /// Kernel limit.
        limit: usize,
    },

    /// A grid side longer than the occupancy grid supports.
    #[error("grid {width}x{height} exceeds the kernel limit of {limit} per side")]
    GridTooLarge {
        /// Grid columns.
        width: u32,
        /// Grid rows.
        height: u32,
        /// Kernel limit.
        limit: u32,
    },

    /// A unit kind code with no matching kind.
    #[error("unknown unit kind code {0}")]
    UnknownKind(u8),

    /// Flat arrays of different lengths.
    #[error("malformed kernel layout: {0}")]
    Layout(String),

    /// Bytes crossing the bridge could not be encoded or decoded.
    #[error("bridge codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The kernel rejected the request.
    #[error("kernel rejected request: {0}")]
    Rejected(String),
}

impl From<KernelError> for BattleError {
    fn from(err: KernelError) -> Self {
        BattleError::unavailable(NativeBackend::ENGINE_ID, err.to_string())
    }
}
