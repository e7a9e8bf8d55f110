// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Fixture shared by the locked and parallel forward suites. Both compare the
//! layer against the same frame-by-frame interpolation, so matching it in each
//! binary means the two execution paths agree with one another.

use ndarray::{Array3, Array4};
use ril_core::FrameSequence;
use ril_nn::{RateEstimates, RateInvarianceLayer};

pub const RATE_TICK: f32 = 0.63;
pub const PHASE_TICK: f32 = 0.2;

pub fn layer() -> RateInvarianceLayer {
    RateInvarianceLayer::new(6, 10, 25).expect("layer")
}

pub fn input() -> FrameSequence {
    FrameSequence::from_array(Array4::from_shape_fn(
        (60, 4, 4, 8),
        |(t, y, x, c)| ((t * 31 + y * 7 + x * 3 + c) % 97) as f32 * 0.173,
    ))
    .expect("input")
}

/// Medians are 0.63 and 0.2, which `reference_output` replays.
pub fn estimates() -> RateEstimates {
    RateEstimates::from_pairs(&[(0.41, 0.2), (0.77, 0.05), (0.63, 0.31)]).expect("estimates")
}

/// Interpolates each output frame on its own from the plan.
pub fn reference_output(layer: &RateInvarianceLayer, input: &FrameSequence) -> Vec<Array3<f32>> {
    let plan = layer.plan(RATE_TICK, PHASE_TICK).expect("plan");
    plan.steps
        .iter()
        .map(|step| {
            let lower = input.frame(step.lower).expect("lower");
            let upper = input.frame(step.upper).expect("upper");
            &lower * (1.0 - step.weight) + &upper * step.weight
        })
        .collect()
}

pub fn assert_matches_reference(output: &FrameSequence, reference: &[Array3<f32>]) {
    assert_eq!(output.len(), reference.len());
    for (t, (frame, expected)) in output.frames().zip(reference).enumerate() {
        for (got, want) in frame.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-5, "frame {t}: {got} vs {want}");
        }
    }
}
