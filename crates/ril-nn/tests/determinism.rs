// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// Runs in its own test binary: the determinism switch is process-wide. The
// unlocked counterpart lives in `parallel_forward.rs`.

mod common;

use ril_config::determinism::{self, DeterminismConfig};

#[test]
fn locked_reduction_order_matches_frame_by_frame_reference() {
    let cfg = determinism::configure(DeterminismConfig {
        enabled: true,
        base_seed: 7,
        single_threaded_reduction: true,
    });
    assert!(cfg.enabled);
    assert!(determinism::lock_reduction_order());

    let layer = common::layer();
    let input = common::input();
    let estimates = common::estimates();

    let sequential = layer.forward(&input, &estimates).expect("sequential forward");
    let again = layer.forward(&input, &estimates).expect("repeat forward");
    assert_eq!(sequential, again);

    let reference = common::reference_output(&layer, &input);
    common::assert_matches_reference(&sequential, &reference);
}
