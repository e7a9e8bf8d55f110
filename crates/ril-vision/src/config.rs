// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ril_core::config::{LayeredConfig, LayeredConfigError};
use ril_core::error::geometry;
use ril_core::{RilError, RilResult};
use serde::{Deserialize, Serialize};

use crate::clip::{ClipSampler, VideoPreprocessor, WindowKind, DEFAULT_FOOTPRINT};
use crate::transforms::{
    AspectResize, CenterCrop, Normalize, RandomCrop, RandomHorizontalFlip, TransformOperation,
    TransformPipeline, DEFAULT_FLIP_PROBABILITY, RGB_MEANS,
};

/// Section name looked up in the layered configuration.
pub const SECTION: &str = "preprocess";

/// Frame geometry, clip length and augmentation switches for video input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Output frame height after cropping.
    pub height: usize,
    /// Output frame width after cropping.
    pub width: usize,
    /// Shorter side after the aspect-preserving resize; `min(height, width)` when unset.
    pub resize_side: Option<usize>,
    /// Frames sampled per video.
    pub footprint: usize,
    pub window: WindowKind,
    /// Random crop and flip instead of the centre crop.
    pub training: bool,
    pub flip_probability: f64,
    /// Per-channel means subtracted from every frame.
    pub means: Vec<f32>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            resize_side: None,
            footprint: DEFAULT_FOOTPRINT,
            window: WindowKind::All,
            training: false,
            flip_probability: DEFAULT_FLIP_PROBABILITY,
            means: RGB_MEANS.to_vec(),
        }
    }
}

impl PreprocessConfig {
    pub fn resize_side(&self) -> usize {
        self.resize_side
            .unwrap_or_else(|| self.height.min(self.width))
    }

    pub fn validate(&self) -> RilResult<()> {
        if self.height == 0 || self.width == 0 || self.resize_side() == 0 {
            return Err(geometry(format!(
                "preprocess geometry must be positive, got {}x{} (side {})",
                self.height,
                self.width,
                self.resize_side()
            )));
        }
        if self.means.is_empty() {
            return Err(RilError::EmptyInput("means"));
        }
        RandomHorizontalFlip::new(self.flip_probability)?;
        ClipSampler::new(self.footprint)?;
        Ok(())
    }

    /// Eval or train pipeline depending on [`Self::training`].
    pub fn pipeline(&self) -> RilResult<TransformPipeline> {
        self.validate()?;
        let resize = TransformOperation::AspectResize(AspectResize::new(self.resize_side()));
        let normalize = TransformOperation::Normalize(Normalize::new(self.means.clone()));
        let pipeline = if self.training {
            TransformPipeline::new()
                .with(resize)
                .with(TransformOperation::RandomCrop(RandomCrop::new(
                    self.height,
                    self.width,
                )))
                .with(TransformOperation::RandomHorizontalFlip(
                    RandomHorizontalFlip::new(self.flip_probability)?,
                ))
                .with(normalize)
        } else {
            TransformPipeline::new()
                .with(resize)
                .with(TransformOperation::CenterCrop(CenterCrop::new(
                    self.height,
                    self.width,
                )))
                .with(normalize)
        };
        Ok(pipeline)
    }

    pub fn sampler(&self) -> RilResult<ClipSampler> {
        ClipSampler::new(self.footprint)
    }

    pub fn preprocessor(&self) -> RilResult<VideoPreprocessor> {
        Ok(VideoPreprocessor::new(
            self.sampler()?,
            self.window,
            self.pipeline()?,
        ))
    }

    /// Reads the `[preprocess]` section, falling back to defaults for missing keys.
    pub fn from_layered(config: &LayeredConfig) -> Result<Self, LayeredConfigError> {
        config
            .section::<Self>(&[SECTION])
            .map(Option::unwrap_or_default)
            .map_err(|source| LayeredConfigError::Section {
                section: SECTION.to_string(),
                source,
            })
    }
}
