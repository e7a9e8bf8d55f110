// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

pub type RilResult<T> = std::result::Result<T, RilError>;

/// Errors raised by frame containers, order statistics and the resampler.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RilError {
    /// A container was asked to hold a zero-sized axis.
    #[error("invalid dimensions {dims:?}; every axis must be non-zero")]
    InvalidDimensions { dims: Vec<usize> },
    /// Two shapes that must agree did not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// An operation received no data where at least one element is required.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),
    /// A value that must be finite was NaN or infinite.
    #[error("non-finite value for {label}: {value}")]
    NonFiniteValue { label: &'static str, value: f32 },
    /// Rate scaling would divide by (almost) zero because `L + phase_tick` vanished.
    #[error("degenerate rate scaling: output_len + phase_tick = {denominator}")]
    DegenerateRate { denominator: f32 },
    /// A configuration value is outside its accepted range.
    #[error("invalid value for {label}")]
    InvalidValue { label: &'static str },
    /// A spatial transform cannot be applied to the given frame geometry.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// Builds a [`RilError::ShapeMismatch`] from two shape slices.
pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> RilError {
    RilError::ShapeMismatch {
        expected: expected.to_vec(),
        got: got.to_vec(),
    }
}

/// Builds a [`RilError::InvalidGeometry`] from a message.
pub fn geometry(message: impl Into<String>) -> RilError {
    RilError::InvalidGeometry(message.into())
}

/// Rejects NaN and infinities with a labelled error.
pub fn ensure_finite(label: &'static str, value: f32) -> RilResult<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RilError::NonFiniteValue { label, value })
    }
}
