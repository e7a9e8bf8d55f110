// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Rate invariance layer.
//!
//! A feature sequence of `N = sets · K` frames is re-indexed onto `L` output
//! steps using a rate and a phase estimated from the input itself. The
//! per-example estimates are collapsed with a median, the output grid is
//! shifted by the phase, stretched by the rate, clipped into `[1, N]` and
//! linearly interpolated between the two bracketing source frames.
//!
//! ```text
//! phase_scaled = phase_tick · (N − L)
//! rate_scaled  = rate_tick · N / (L + phase_tick)
//! idx[i]       = clip(rate_scaled · (i + 1 + phase_scaled), 1, N)
//! ```

pub mod config;
pub mod estimates;
pub mod layers;
pub mod stage;

pub use config::ResamplerConfig;
pub use estimates::{FixedEstimator, RateEstimates, RateEstimator};
pub use layers::rate_invariance::{
    AggregatedEstimate, RateInvarianceLayer, ResampleGradients, ResamplePlan, ResampleStep,
};
pub use stage::RateInvariantStage;
