// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ril_core::{FrameSequence, RilResult};

use crate::estimates::{RateEstimates, RateEstimator};
use crate::layers::rate_invariance::RateInvarianceLayer;

/// Estimator head plus resampler: the block that sits between the frame
/// encoder and the recurrent classifier.
pub struct RateInvariantStage<E> {
    estimator: E,
    layer: RateInvarianceLayer,
}

impl<E: RateEstimator> RateInvariantStage<E> {
    pub fn new(estimator: E, layer: RateInvarianceLayer) -> Self {
        Self { estimator, layer }
    }

    pub fn layer(&self) -> &RateInvarianceLayer {
        &self.layer
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Estimates rate/phase from `input` and resamples it to `L` frames.
    pub fn forward(&self, input: &FrameSequence) -> RilResult<FrameSequence> {
        self.forward_with_estimates(input).map(|(_, output)| output)
    }

    /// Like [`forward`](Self::forward) but also returns the raw estimates, which
    /// callers need to run [`RateInvarianceLayer::backward`].
    pub fn forward_with_estimates(
        &self,
        input: &FrameSequence,
    ) -> RilResult<(RateEstimates, FrameSequence)> {
        let estimates = self.estimator.estimate(input)?;
        let output = self.layer.forward(input, &estimates)?;
        Ok((estimates, output))
    }
}
