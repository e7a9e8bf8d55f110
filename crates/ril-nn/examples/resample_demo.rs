// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// Run with `RUST_LOG=ril_nn=debug cargo run -p ril-nn --example resample_demo`
// to see the per-call plan summary. Set `RIL_CONFIG_RUN=run.json` to override
// the `[resampler]` section for a single invocation.

use std::error::Error;

use ndarray::Array4;
use ril_core::config::{ConfigLayering, LayeredConfig};
use ril_core::telemetry::{init_tracing, shutdown_tracing};
use ril_core::FrameSequence;
use ril_nn::{
    FixedEstimator, RateEstimates, RateInvarianceLayer, RateInvariantStage, ResamplerConfig,
};
use tracing::info;

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let layered = LayeredConfig::load(ConfigLayering::discover())?;
    for event in layered.events() {
        info!(layer = ?event.layer, path = %event.path, "config override");
    }
    let config = ResamplerConfig::from_layered(&layered)?;
    let layer = RateInvarianceLayer::from_config(&config)?;

    // Each frame holds its own index so the selected positions are readable.
    let input = FrameSequence::from_array(Array4::from_shape_fn(
        (layer.source_len(), 1, 1, 1),
        |(t, _, _, _)| t as f32,
    ))?;

    for (rate, phase) in [(0.5, 0.0), (1.0, 0.0), (0.35, 0.4)] {
        let estimates = RateEstimates::from_pairs(&[
            (rate * 0.9, phase),
            (rate, phase),
            (rate * 1.4, phase + 0.1),
        ])?;
        let stage = RateInvariantStage::new(FixedEstimator::new(estimates), layer.clone());
        let (estimates, output) = stage.forward_with_estimates(&input)?;
        let aggregated = layer.aggregate(&estimates)?;
        let plan = layer.plan(aggregated.rate_tick(), aggregated.phase_tick())?;
        let positions: Vec<f32> = output.frames().map(|frame| frame[[0, 0, 0]]).collect();
        info!(
            rate_tick = aggregated.rate_tick(),
            phase_tick = aggregated.phase_tick(),
            saturated = plan.saturated(),
            first = positions.first().copied().unwrap_or_default(),
            last = positions.last().copied().unwrap_or_default(),
            "resampled {} frames to {}",
            input.len(),
            output.len()
        );
    }

    shutdown_tracing();
    Ok(())
}
