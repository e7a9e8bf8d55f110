// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Temporal clip sampling.
//!
//! Every video is read from a start offset drawn from an RNG seeded with the
//! video index, looping back to frame 0 when the clip runs past the end. The
//! same index therefore always yields the same clip.

use rand::rngs::StdRng;
use rand::Rng;
use ril_config::determinism;
use ril_core::{FrameSequence, RilError, RilResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::transforms::TransformPipeline;

/// Number of frames sampled per video by default.
pub const DEFAULT_FOOTPRINT: usize = 250;

const CLIP_LABEL: &str = "ril.clip";

/// How a sampled clip is trimmed before it reaches the network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Keep every frame.
    #[default]
    All,
    /// Keep the largest multiple of `k` frames so the clip splits into whole sets.
    KFrames(usize),
}

impl WindowKind {
    pub fn apply(&self, video: &FrameSequence) -> RilResult<FrameSequence> {
        match *self {
            WindowKind::All => Ok(video.clone()),
            WindowKind::KFrames(0) => Err(RilError::InvalidValue { label: "window_k" }),
            WindowKind::KFrames(k) => {
                let keep = video.len() / k * k;
                if keep == 0 {
                    return Err(RilError::EmptyInput("window"));
                }
                let indices: Vec<usize> = (0..keep).collect();
                video.select(&indices)
            }
        }
    }
}

/// Seeded start offset plus wrap-around read of a fixed number of frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipSampler {
    footprint: usize,
}

impl Default for ClipSampler {
    fn default() -> Self {
        Self {
            footprint: DEFAULT_FOOTPRINT,
        }
    }
}

impl ClipSampler {
    pub fn new(footprint: usize) -> RilResult<Self> {
        if footprint == 0 {
            return Err(RilError::InvalidValue { label: "footprint" });
        }
        Ok(Self { footprint })
    }

    pub fn footprint(&self) -> usize {
        self.footprint
    }

    /// RNG used for everything random about video `index`.
    pub fn rng_for(index: u64) -> StdRng {
        determinism::rng_from_optional(Some(index), CLIP_LABEL)
    }

    /// Start offset in `[0, frames - 1)`; zero for single-frame videos.
    pub fn draw_offset<R: Rng + ?Sized>(&self, rng: &mut R, frames: usize) -> RilResult<usize> {
        match frames {
            0 => Err(RilError::EmptyInput("video")),
            1 => Ok(0),
            n => Ok(rng.gen_range(0..n - 1)),
        }
    }

    /// Frame indices `(offset + t) mod frames` for `t < footprint`.
    pub fn indices(&self, offset: usize, frames: usize) -> RilResult<Vec<usize>> {
        if frames == 0 {
            return Err(RilError::EmptyInput("video"));
        }
        Ok((0..self.footprint)
            .map(|t| (offset + t) % frames)
            .collect())
    }

    /// Samples the clip for video `index` from its own seeded RNG.
    pub fn sample(&self, index: u64, video: &FrameSequence) -> RilResult<FrameSequence> {
        let mut rng = Self::rng_for(index);
        self.sample_with(&mut rng, index, video)
    }

    fn sample_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        index: u64,
        video: &FrameSequence,
    ) -> RilResult<FrameSequence> {
        let frames = video.len();
        let offset = self.draw_offset(rng, frames)?;
        if frames < self.footprint {
            warn!(
                video = index,
                frames,
                footprint = self.footprint,
                "video shorter than clip footprint; looping"
            );
        }
        debug!(video = index, frames, offset, footprint = self.footprint, "sampled clip");
        video.select(&self.indices(offset, frames)?)
    }
}

/// Clip sampling, windowing and per-frame transforms for one video.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoPreprocessor {
    pub sampler: ClipSampler,
    pub window: WindowKind,
    pub pipeline: TransformPipeline,
}

impl VideoPreprocessor {
    pub fn new(sampler: ClipSampler, window: WindowKind, pipeline: TransformPipeline) -> Self {
        Self {
            sampler,
            window,
            pipeline,
        }
    }

    pub fn run(&self, index: u64, video: &FrameSequence) -> RilResult<FrameSequence> {
        let mut rng = ClipSampler::rng_for(index);
        let clip = self.sampler.sample_with(&mut rng, index, video)?;
        let clip = self.window.apply(&clip)?;
        self.pipeline.apply_clip(&clip, &mut rng)
    }
}

/// Samples the clip for video `index` and transforms every frame of it.
pub fn preprocess_video(
    index: u64,
    video: &FrameSequence,
    sampler: &ClipSampler,
    pipeline: &TransformPipeline,
) -> RilResult<FrameSequence> {
    VideoPreprocessor::new(*sampler, WindowKind::All, pipeline.clone()).run(index, video)
}
