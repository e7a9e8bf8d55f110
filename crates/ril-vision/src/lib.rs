// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Video input preparation for the rate invariance layer: seeded temporal clip
//! sampling followed by per-frame resize, crop, flip and mean subtraction.

pub mod clip;
pub mod config;
pub mod transforms;

pub use clip::{preprocess_video, ClipSampler, VideoPreprocessor, WindowKind};
pub use config::PreprocessConfig;
pub use transforms::{
    AspectResize, CenterCrop, Normalize, RandomCrop, RandomHorizontalFlip, Resize,
    TransformOperation, TransformPipeline,
};
