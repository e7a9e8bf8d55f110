// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Learned piecewise-linear temporal resampling.
//!
//! Out-of-range indices are saturated with clamps rather than rejected so the
//! mapping stays continuous in the rate and phase. Source positions are
//! 1-based inside the plan and converted to 0-based frame offsets once, when
//! the bracketing frames are recorded.

use ndarray::{Array3, Array4, ArrayView3, Axis, Zip};
use rayon::prelude::*;
use ril_config::determinism;
use ril_core::error::{ensure_finite, shape_mismatch};
use ril_core::ops::{median, MedianRule, OrderStatistic};
use ril_core::{FrameSequence, RilError, RilResult};
use tracing::{debug, warn};

use crate::config::ResamplerConfig;
use crate::estimates::RateEstimates;

/// Clip in the order `max(min(value, hi), lo)`.
#[inline]
fn clip(value: f32, lo: f32, hi: f32) -> f32 {
    value.min(hi).max(lo)
}

/// Batch-aggregated rate and phase with their selection support.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedEstimate {
    pub rate: OrderStatistic,
    pub phase: OrderStatistic,
}

impl AggregatedEstimate {
    pub fn rate_tick(&self) -> f32 {
        self.rate.value
    }

    pub fn phase_tick(&self) -> f32 {
        self.phase.value
    }
}

/// Resolution of a single output step onto the source sequence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResampleStep {
    /// `rate_scaled · (i + 1 + phase_scaled)` before clipping (1-based).
    pub raw_index: f32,
    /// `raw_index` clipped into `[1, N]`.
    pub index: f32,
    /// 0-based frame below (or at) `index`.
    pub lower: usize,
    /// 0-based frame above `index`.
    pub upper: usize,
    /// Interpolation weight of `upper`, `d1 / d2`; zero when `d2 == 0`.
    pub weight: f32,
    /// `d2 = x1 − x0`.
    pub span: f32,
    /// Whether the clip to `[1, N]` changed the index.
    pub saturated: bool,
}

/// Every quantity derived from `(N, L, rate_tick, phase_tick)` before any
/// frame data is touched.
#[derive(Clone, Debug, PartialEq)]
pub struct ResamplePlan {
    pub source_len: usize,
    pub rate_tick: f32,
    pub phase_tick: f32,
    pub phase_scaled: f32,
    pub rate_scaled: f32,
    /// `L + phase_tick`.
    pub denominator: f32,
    pub steps: Vec<ResampleStep>,
}

impl ResamplePlan {
    pub fn build(
        source_len: usize,
        output_len: usize,
        rate_tick: f32,
        phase_tick: f32,
        singularity_epsilon: f32,
    ) -> RilResult<Self> {
        if source_len == 0 {
            return Err(RilError::InvalidDimensions {
                dims: vec![source_len],
            });
        }
        if output_len == 0 {
            return Err(RilError::InvalidValue {
                label: "output_len",
            });
        }
        let rate_tick = ensure_finite("rate_tick", rate_tick)?;
        let phase_tick = ensure_finite("phase_tick", phase_tick)?;

        let n = source_len as f32;
        let l = output_len as f32;
        let phase_scaled = phase_tick * (n - l);
        let denominator = l + phase_tick;
        if !(denominator.abs() > singularity_epsilon) {
            return Err(RilError::DegenerateRate { denominator });
        }
        let rate_scaled = ensure_finite("rate_scaled", rate_tick * n / denominator)?;

        let steps = (0..output_len)
            .map(|i| {
                let raw_index = rate_scaled * ((i + 1) as f32 + phase_scaled);
                let index = clip(raw_index, 1.0, n);
                let (x0, x1) = if source_len == 1 {
                    (1.0, 1.0)
                } else {
                    let base = index.floor();
                    (clip(base, 1.0, n - 1.0), clip(base + 1.0, 2.0, n))
                };
                let span = x1 - x0;
                let weight = if span > 0.0 { (index - x0) / span } else { 0.0 };
                ResampleStep {
                    raw_index,
                    index,
                    lower: x0 as usize - 1,
                    upper: x1 as usize - 1,
                    weight,
                    span,
                    saturated: !(1.0..=n).contains(&raw_index),
                }
            })
            .collect();

        Ok(Self {
            source_len,
            rate_tick,
            phase_tick,
            phase_scaled,
            rate_scaled,
            denominator,
            steps,
        })
    }

    pub fn output_len(&self) -> usize {
        self.steps.len()
    }

    pub fn raw_indices(&self) -> Vec<f32> {
        self.steps.iter().map(|step| step.raw_index).collect()
    }

    pub fn indices(&self) -> Vec<f32> {
        self.steps.iter().map(|step| step.index).collect()
    }

    pub fn saturated(&self) -> usize {
        self.steps.iter().filter(|step| step.saturated).count()
    }
}

/// Gradients produced by [`RateInvarianceLayer::backward`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResampleGradients {
    /// Gradient w.r.t. every source frame, `(N, H, W, C)`.
    pub input: Array4<f32>,
    /// Gradient w.r.t. the aggregated rate.
    pub rate_tick: f32,
    /// Gradient w.r.t. the aggregated phase.
    pub phase_tick: f32,
    /// Gradient w.r.t. each raw rate estimate; non-zero only where the median selected.
    pub rate: Vec<f32>,
    /// Gradient w.r.t. each raw phase estimate.
    pub phase: Vec<f32>,
}

/// Stateless temporal resampler between the frame encoder and the recurrent head.
#[derive(Clone, Debug, PartialEq)]
pub struct RateInvarianceLayer {
    sets: usize,
    frames_per_set: usize,
    output_len: usize,
    median: MedianRule,
    singularity_epsilon: f32,
}

impl RateInvarianceLayer {
    pub fn new(sets: usize, frames_per_set: usize, output_len: usize) -> RilResult<Self> {
        Self::from_config(&ResamplerConfig {
            sets,
            frames_per_set,
            output_len,
            ..ResamplerConfig::default()
        })
    }

    pub fn from_config(config: &ResamplerConfig) -> RilResult<Self> {
        config.validate()?;
        Ok(Self {
            sets: config.sets,
            frames_per_set: config.frames_per_set,
            output_len: config.output_len,
            median: config.median,
            singularity_epsilon: config.singularity_epsilon,
        })
    }

    /// Switches the batch aggregation rule.
    pub fn with_median(mut self, median: MedianRule) -> Self {
        self.median = median;
        self
    }

    /// Expected input length `N = sets · K`.
    pub fn source_len(&self) -> usize {
        self.sets * self.frames_per_set
    }

    pub fn output_len(&self) -> usize {
        self.output_len
    }

    pub fn median_rule(&self) -> MedianRule {
        self.median
    }

    /// Collapses the batch of raw estimates into `(rate_tick, phase_tick)`.
    pub fn aggregate(&self, estimates: &RateEstimates) -> RilResult<AggregatedEstimate> {
        Ok(AggregatedEstimate {
            rate: median(estimates.rate(), self.median)?,
            phase: median(estimates.phase(), self.median)?,
        })
    }

    /// Builds the index plan for explicit ticks.
    pub fn plan(&self, rate_tick: f32, phase_tick: f32) -> RilResult<ResamplePlan> {
        ResamplePlan::build(
            self.source_len(),
            self.output_len,
            rate_tick,
            phase_tick,
            self.singularity_epsilon,
        )
    }

    fn ensure_input(&self, input: &FrameSequence) -> RilResult<()> {
        if input.len() != self.source_len() {
            let (h, w, c) = input.frame_shape();
            return Err(shape_mismatch(
                &[self.source_len(), h, w, c],
                &[input.len(), h, w, c],
            ));
        }
        Ok(())
    }

    /// Resamples `input` to `L` frames using the median of `estimates`.
    pub fn forward(
        &self,
        input: &FrameSequence,
        estimates: &RateEstimates,
    ) -> RilResult<FrameSequence> {
        self.ensure_input(input)?;
        let aggregated = self.aggregate(estimates)?;
        let plan = self.plan(aggregated.rate_tick(), aggregated.phase_tick())?;
        self.apply_plan(input, &plan)
    }

    /// Interpolates `input` along a prepared plan.
    ///
    /// The plan must cover exactly `L` steps and reference only frames of `input`.
    pub fn apply_plan(
        &self,
        input: &FrameSequence,
        plan: &ResamplePlan,
    ) -> RilResult<FrameSequence> {
        self.ensure_input(input)?;
        if plan.source_len != input.len() {
            return Err(shape_mismatch(&[plan.source_len], &[input.len()]));
        }
        if plan.output_len() != self.output_len {
            return Err(shape_mismatch(&[self.output_len], &[plan.output_len()]));
        }
        if let Some(step) = plan
            .steps
            .iter()
            .find(|step| step.lower >= input.len() || step.upper >= input.len())
        {
            return Err(shape_mismatch(
                &[input.len()],
                &[step.lower.max(step.upper).saturating_add(1)],
            ));
        }
        log_plan(plan);

        let source = input.as_array();
        let interpolate = |step: &ResampleStep| -> Array3<f32> {
            lerp(
                source.index_axis(Axis(0), step.lower),
                source.index_axis(Axis(0), step.upper),
                step.weight,
            )
        };
        let frames: Vec<Array3<f32>> = if determinism::lock_reduction_order() {
            plan.steps.iter().map(interpolate).collect()
        } else {
            plan.steps.par_iter().map(interpolate).collect()
        };
        FrameSequence::from_frames(&frames)
    }

    /// Propagates `grad_output` (shape `(L, H, W, C)`) back to the source frames
    /// and to the raw rate/phase estimates.
    ///
    /// `floor` contributes no gradient and a clip passes the gradient only while
    /// the clipped value lies inside its inclusive bounds.
    pub fn backward(
        &self,
        input: &FrameSequence,
        estimates: &RateEstimates,
        grad_output: &FrameSequence,
    ) -> RilResult<ResampleGradients> {
        self.ensure_input(input)?;
        let (h, w, c) = input.frame_shape();
        let expected = [self.output_len, h, w, c];
        if grad_output.as_array().shape() != expected {
            return Err(shape_mismatch(&expected, grad_output.as_array().shape()));
        }

        let aggregated = self.aggregate(estimates)?;
        let plan = self.plan(aggregated.rate_tick(), aggregated.phase_tick())?;
        let source = input.as_array();
        let grads = grad_output.as_array();

        let mut grad_input = Array4::<f32>::zeros(source.raw_dim());
        let mut grad_rate_scaled = 0.0f32;
        let mut grad_phase_scaled = 0.0f32;

        for (i, (step, grad)) in plan.steps.iter().zip(grads.outer_iter()).enumerate() {
            grad_input
                .index_axis_mut(Axis(0), step.lower)
                .scaled_add(1.0 - step.weight, &grad);
            grad_input
                .index_axis_mut(Axis(0), step.upper)
                .scaled_add(step.weight, &grad);

            if step.saturated || step.span <= 0.0 {
                continue;
            }
            let mut slope = 0.0f32;
            Zip::from(&grad)
                .and(&source.index_axis(Axis(0), step.lower))
                .and(&source.index_axis(Axis(0), step.upper))
                .for_each(|&g, &y0, &y1| slope += g * (y1 - y0));
            let grad_raw = slope / step.span;

            grad_rate_scaled += grad_raw * ((i + 1) as f32 + plan.phase_scaled);
            grad_phase_scaled += grad_raw * plan.rate_scaled;
        }

        let n = plan.source_len as f32;
        let l = self.output_len as f32;
        let grad_rate_tick = grad_rate_scaled * n / plan.denominator;
        let grad_phase_tick = grad_rate_scaled * (-plan.rate_scaled / plan.denominator)
            + grad_phase_scaled * (n - l);

        let batch = estimates.batch_size();
        Ok(ResampleGradients {
            input: grad_input,
            rate_tick: grad_rate_tick,
            phase_tick: grad_phase_tick,
            rate: aggregated.rate.scatter_gradient(grad_rate_tick, batch),
            phase: aggregated.phase.scatter_gradient(grad_phase_tick, batch),
        })
    }
}

/// `(1 − w)·y0 + w·y1`; exact at both endpoints.
fn lerp(y0: ArrayView3<'_, f32>, y1: ArrayView3<'_, f32>, weight: f32) -> Array3<f32> {
    let mut out = y0.mapv(|v| v * (1.0 - weight));
    out.scaled_add(weight, &y1);
    out
}

fn log_plan(plan: &ResamplePlan) {
    let saturated = plan.saturated();
    debug!(
        source_len = plan.source_len,
        output_len = plan.output_len(),
        rate_tick = plan.rate_tick,
        phase_tick = plan.phase_tick,
        rate_scaled = plan.rate_scaled,
        phase_scaled = plan.phase_scaled,
        saturated,
        "rate invariance resample"
    );
    if saturated == plan.output_len() {
        warn!(
            rate_scaled = plan.rate_scaled,
            phase_scaled = plan.phase_scaled,
            "every output step saturated; resampled sequence is constant"
        );
    }
}
