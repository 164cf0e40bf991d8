//! # Battle Native
//!
//! Accelerated backend for `battle_core`.
//!
//! The kernel keeps unit state in flat arrays with an occupancy grid and is
//! entered through a byte-buffer bridge: the host flattens the match config
//! into a [`KernelConfig`], encodes it with bincode and gets an encoded result
//! back. Decisions are still made host-side by the Rhai sandbox, reached
//! through [`KernelHost`](bridge::KernelHost) callbacks.
//!
//! Results are bit-for-bit identical to the reference engine for the same
//! config and seed. Configs beyond [`MAX_UNITS`] or [`MAX_GRID_SIDE`] are
//! refused with `BackendUnavailable`, which the backend selector answers by
//! falling back to the reference engine.
//!
//! ## Features
//!
//! - `kernel` (default) - build the kernel. Without it [`NativeBackend::load`]
//!   fails and only the layout translation is available.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

mod backend;
pub mod error;
pub mod layout;

#[cfg(feature = "kernel")]
pub mod bridge;
#[cfg(feature = "kernel")]
pub mod kernel;

pub use backend::NativeBackend;
pub use error::KernelError;
pub use layout::{KernelConfig, MAX_GRID_SIDE, MAX_UNITS};
