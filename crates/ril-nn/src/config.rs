// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ril_core::config::{LayeredConfig, LayeredConfigError};
use ril_core::ops::MedianRule;
use ril_core::{RilError, RilResult};
use serde::{Deserialize, Serialize};

/// Section name looked up in the layered configuration.
pub const SECTION: &str = "resampler";

/// Geometry and numeric policy of a [`crate::RateInvarianceLayer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerConfig {
    /// Number of chunks in the source sequence.
    pub sets: usize,
    /// Frames per chunk (`K`).
    pub frames_per_set: usize,
    /// Output sequence length (`L`).
    pub output_len: usize,
    /// Batch aggregation applied to the raw rate and phase estimates.
    pub median: MedianRule,
    /// Smallest accepted `|L + phase_tick|` before rate scaling is refused.
    pub singularity_epsilon: f32,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            sets: 10,
            frames_per_set: 25,
            output_len: 50,
            median: MedianRule::Lower,
            singularity_epsilon: 1e-6,
        }
    }
}

impl ResamplerConfig {
    /// Source length `N = sets · K`.
    pub fn source_len(&self) -> usize {
        self.sets.saturating_mul(self.frames_per_set)
    }

    pub fn validate(&self) -> RilResult<()> {
        if self.sets == 0 {
            return Err(RilError::InvalidValue { label: "sets" });
        }
        if self.frames_per_set == 0 {
            return Err(RilError::InvalidValue {
                label: "frames_per_set",
            });
        }
        if self.sets.checked_mul(self.frames_per_set).is_none() {
            return Err(RilError::InvalidValue { label: "sets" });
        }
        if self.output_len == 0 {
            return Err(RilError::InvalidValue {
                label: "output_len",
            });
        }
        if !(self.singularity_epsilon.is_finite() && self.singularity_epsilon >= 0.0) {
            return Err(RilError::InvalidValue {
                label: "singularity_epsilon",
            });
        }
        Ok(())
    }

    /// Reads the `[resampler]` section, falling back to defaults for missing keys.
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
