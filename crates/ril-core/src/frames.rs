// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Ordered sequences of `(H, W, C)` feature maps.

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};

use crate::error::{shape_mismatch, RilError, RilResult};

/// Time-ordered stack of feature maps stored as a single `(N, H, W, C)` array.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSequence {
    data: Array4<f32>,
}

impl FrameSequence {
    /// Wraps an existing `(N, H, W, C)` array.
    pub fn from_array(data: Array4<f32>) -> RilResult<Self> {
        if data.shape().iter().any(|&axis| axis == 0) {
            return Err(RilError::InvalidDimensions {
                dims: data.shape().to_vec(),
            });
        }
        Ok(Self { data })
    }

    /// Stacks individual frames. Every frame must share the first frame's shape.
    pub fn from_frames(frames: &[Array3<f32>]) -> RilResult<Self> {
        let first = frames
            .first()
            .ok_or(RilError::EmptyInput("frame_sequence_frames"))?;
        let (height, width, channels) = first.dim();
        for frame in &frames[1..] {
            if frame.dim() != (height, width, channels) {
                return Err(shape_mismatch(first.shape(), frame.shape()));
            }
        }
        let mut data = Array4::<f32>::zeros((frames.len(), height, width, channels));
        for (mut slot, frame) in data.outer_iter_mut().zip(frames) {
            slot.assign(frame);
        }
        Self::from_array(data)
    }

    /// Sequence of `frames` zero-filled maps.
    pub fn zeros(frames: usize, height: usize, width: usize, channels: usize) -> RilResult<Self> {
        Self::from_array(Array4::zeros((frames, height, width, channels)))
    }

    /// Number of frames `N`.
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Always `false`: construction rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-frame `(H, W, C)`.
    pub fn frame_shape(&self) -> (usize, usize, usize) {
        let (_, h, w, c) = self.data.dim();
        (h, w, c)
    }

    pub fn frame(&self, index: usize) -> RilResult<ArrayView3<'_, f32>> {
        if index >= self.len() {
            return Err(RilError::InvalidValue {
                label: "frame_index",
            });
        }
        Ok(self.data.index_axis(Axis(0), index))
    }

    pub fn frames(&self) -> impl Iterator<Item = ArrayView3<'_, f32>> + '_ {
        self.data.outer_iter()
    }

    pub fn as_array(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }

    /// Gathers frames by 0-based index, in the order given. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> RilResult<Self> {
        if indices.is_empty() {
            return Err(RilError::EmptyInput("frame_sequence_select"));
        }
        if indices.iter().any(|&index| index >= self.len()) {
            return Err(RilError::InvalidValue {
                label: "frame_index",
            });
        }
        Self::from_array(self.data.select(Axis(0), indices))
    }

    /// Verifies that `other` holds exactly the same `(N, H, W, C)` geometry.
    pub fn ensure_same_shape(&self, other: &FrameSequence) -> RilResult<()> {
        if self.data.shape() != other.data.shape() {
            return Err(shape_mismatch(self.data.shape(), other.data.shape()));
        }
        Ok(())
    }
}
