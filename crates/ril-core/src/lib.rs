// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Core primitives shared by the rate invariance crates.
//!
//! [`FrameSequence`] is the `(N, H, W, C)` container every stage exchanges,
//! [`ops::order`] provides the robust batch aggregation used to collapse
//! per-example rate/phase estimates, and [`config`] merges layered TOML/JSON
//! configuration into typed sections.

pub mod config;
pub mod error;
pub mod frames;
pub mod ops;
pub mod telemetry;

pub use error::{RilError, RilResult};
pub use frames::FrameSequence;
