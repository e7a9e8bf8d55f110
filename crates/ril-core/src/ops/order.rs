// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Order-statistic selection over batch estimates.
//!
//! Selection uses a partial sort keyed on `(value, index)`. Equal values are
//! ranked by batch index, so the selected entry is deterministic.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, RilError, RilResult};

/// How the central value of a batch is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedianRule {
    /// Ascending rank `(B - 1) / 2`: the middle element for odd `B`, the lower
    /// of the two middle elements for even `B`.
    #[default]
    Lower,
    /// Mean of the two middle elements for even `B`.
    Midpoint,
}

/// A selected value together with the batch entries it was computed from.
///
/// `support` lists `(batch_index, weight)` pairs such that
/// `value == Σ weight · values[batch_index]`; gradients flow back along it.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderStatistic {
    pub value: f32,
    pub support: Vec<(usize, f32)>,
}

impl OrderStatistic {
    /// Scatters a scalar gradient onto a batch-sized buffer.
    pub fn scatter_gradient(&self, grad: f32, batch: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; batch];
        for &(index, weight) in &self.support {
            if let Some(slot) = out.get_mut(index) {
                *slot += weight * grad;
            }
        }
        out
    }
}

fn by_value_then_index(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

fn keyed(label: &'static str, values: &[f32]) -> RilResult<Vec<(f32, usize)>> {
    if values.is_empty() {
        return Err(RilError::EmptyInput(label));
    }
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| ensure_finite(label, value).map(|v| (v, index)))
        .collect()
}

/// Returns `(batch_index, value)` of the element at ascending `rank`.
pub fn kth_smallest(values: &[f32], rank: usize) -> RilResult<(usize, f32)> {
    let mut entries = keyed("order_statistic", values)?;
    if rank >= entries.len() {
        return Err(RilError::InvalidValue {
            label: "order_statistic_rank",
        });
    }
    let (_, &mut (value, index), _) = entries.select_nth_unstable_by(rank, by_value_then_index);
    Ok((index, value))
}

/// Robust central estimate of `values` under `rule`.
pub fn median(values: &[f32], rule: MedianRule) -> RilResult<OrderStatistic> {
    let mut entries = keyed("median", values)?;
    let batch = entries.len();
    let rank = (batch - 1) / 2;
    let (_, &mut (low_value, low_index), upper) =
        entries.select_nth_unstable_by(rank, by_value_then_index);

    if rule == MedianRule::Lower || batch % 2 == 1 {
        return Ok(OrderStatistic {
            value: low_value,
            support: vec![(low_index, 1.0)],
        });
    }

    // Even batch: the next order statistic is the minimum of the upper partition.
    let &(high_value, high_index) = upper
        .iter()
        .min_by(|a, b| by_value_then_index(a, b))
        .ok_or(RilError::EmptyInput("median_upper_partition"))?;
    Ok(OrderStatistic {
        value: 0.5 * (low_value + high_value),
        support: vec![(low_index, 0.5), (high_index, 0.5)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_batch_selects_middle_element() {
        let values = [0.9, 0.1, 0.5, 0.7, 0.3];
        let stat = median(&values, MedianRule::Lower).unwrap();
        assert_eq!(stat.value, 0.5);
        assert_eq!(stat.support, vec![(2, 1.0)]);
        // Odd batches agree under both rules.
        assert_eq!(median(&values, MedianRule::Midpoint).unwrap(), stat);
    }

    #[test]
    fn even_batch_lower_rule_picks_rank_half_minus_one() {
        // Ascending: 0.1, 0.3, 0.7, 0.9 -> rank 4/2 - 1 = 1 -> 0.3
        let values = [0.7, 0.3, 0.9, 0.1];
        let stat = median(&values, MedianRule::Lower).unwrap();
        assert_eq!(stat.value, 0.3);
        assert_eq!(stat.support, vec![(1, 1.0)]);
    }

    #[test]
    fn even_batch_midpoint_rule_averages_middle_pair() {
        let values = [0.7, 0.3, 0.9, 0.1];
        let stat = median(&values, MedianRule::Midpoint).unwrap();
        assert!((stat.value - 0.5).abs() < 1e-6);
        assert_eq!(stat.support, vec![(1, 0.5), (0, 0.5)]);
    }

    #[test]
    fn single_element_batch_is_its_own_median() {
        let stat = median(&[1.25], MedianRule::Lower).unwrap();
        assert_eq!(stat.value, 1.25);
        assert_eq!(stat.support, vec![(0, 1.0)]);
    }

    #[test]
    fn ties_are_ranked_by_batch_index() {
        // Ascending keys: (1.0, 1), (2.0, 0), (2.0, 2), (2.0, 3), (3.0, 4).
        let stat = median(&[2.0, 1.0, 2.0, 2.0, 3.0], MedianRule::Lower).unwrap();
        assert_eq!(stat.value, 2.0);
        assert_eq!(stat.support, vec![(2, 1.0)]);
    }

    #[test]
    fn kth_smallest_matches_sorted_order() {
        let values = [4.0, -1.0, 2.5, 0.0];
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (rank, expected) in sorted.iter().enumerate() {
            let (index, value) = kth_smallest(&values, rank).unwrap();
            assert_eq!(value, *expected);
            assert_eq!(values[index], *expected);
        }
        assert!(kth_smallest(&values, 4).is_err());
    }

    #[test]
    fn rejects_empty_and_non_finite_batches() {
        assert_eq!(
            median(&[], MedianRule::Lower).unwrap_err(),
            RilError::EmptyInput("median")
        );
        assert!(matches!(
            median(&[0.1, f32::NAN], MedianRule::Lower),
            Err(RilError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn gradient_scatters_along_support() {
        let stat = median(&[0.7, 0.3, 0.9, 0.1], MedianRule::Midpoint).unwrap();
        assert_eq!(stat.scatter_gradient(2.0, 4), vec![1.0, 1.0, 0.0, 0.0]);
    }
}
