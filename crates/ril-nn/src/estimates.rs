// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Raw per-example rate/phase estimates and the estimator seam.

use ndarray::ArrayView2;
use ril_core::error::{ensure_finite, shape_mismatch};
use ril_core::{FrameSequence, RilError, RilResult};

/// One `(rate_raw, phase_raw)` pair per batch element.
#[derive(Clone, Debug, PartialEq)]
pub struct RateEstimates {
    rate: Vec<f32>,
    phase: Vec<f32>,
}

impl RateEstimates {
    pub fn new(rate: Vec<f32>, phase: Vec<f32>) -> RilResult<Self> {
        if rate.is_empty() {
            return Err(RilError::EmptyInput("rate_estimates"));
        }
        if rate.len() != phase.len() {
            return Err(shape_mismatch(&[rate.len()], &[phase.len()]));
        }
        for &value in &rate {
            ensure_finite("rate_raw", value)?;
        }
        for &value in &phase {
            ensure_finite("phase_raw", value)?;
        }
        Ok(Self { rate, phase })
    }

    pub fn from_pairs(pairs: &[(f32, f32)]) -> RilResult<Self> {
        let (rate, phase) = pairs.iter().copied().unzip();
        Self::new(rate, phase)
    }

    /// Reads a `(B, 2)` array: column 0 is the rate, column 1 the phase.
    pub fn from_array(params: ArrayView2<'_, f32>) -> RilResult<Self> {
        let (batch, cols) = params.dim();
        if cols != 2 {
            return Err(shape_mismatch(&[batch, 2], &[batch, cols]));
        }
        Self::new(params.column(0).to_vec(), params.column(1).to_vec())
    }

    /// Squashes estimator logits through the logistic sigmoid, which bounds
    /// both the rate and the phase to `(0, 1)`.
    pub fn from_logits(logits: ArrayView2<'_, f32>) -> RilResult<Self> {
        Self::from_array(logits.mapv(sigmoid).view())
    }

    /// The same pair repeated for every batch element.
    pub fn uniform(rate: f32, phase: f32, batch: usize) -> RilResult<Self> {
        Self::new(vec![rate; batch], vec![phase; batch])
    }

    pub fn batch_size(&self) -> usize {
        self.rate.len()
    }

    pub fn rate(&self) -> &[f32] {
        &self.rate
    }

    pub fn phase(&self) -> &[f32] {
        &self.phase
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Upstream head that derives rate/phase estimates from the sequence itself.
pub trait RateEstimator {
    fn estimate(&self, input: &FrameSequence) -> RilResult<RateEstimates>;
}

impl<F> RateEstimator for F
where
    F: Fn(&FrameSequence) -> RilResult<RateEstimates>,
{
    fn estimate(&self, input: &FrameSequence) -> RilResult<RateEstimates> {
        self(input)
    }
}

/// Estimator that ignores its input and always reports the same batch.
#[derive(Clone, Debug)]
pub struct FixedEstimator {
    estimates: RateEstimates,
}

impl FixedEstimator {
    pub fn new(estimates: RateEstimates) -> Self {
        Self { estimates }
    }
}

impl RateEstimator for FixedEstimator {
    fn estimate(&self, _input: &FrameSequence) -> RilResult<RateEstimates> {
        Ok(self.estimates.clone())
    }
}
