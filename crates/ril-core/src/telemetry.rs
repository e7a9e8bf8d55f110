// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::sync::OnceLock;

use ril_config::tracing::{self as config_tracing, InitError};
use tracing::warn;

static INIT_GUARD: OnceLock<Result<(), InitError>> = OnceLock::new();

/// Installs the process-wide subscriber once. Repeated calls are no-ops; a
/// subscriber already installed by the host application is kept and logged.
pub fn init_tracing() {
    let result = INIT_GUARD.get_or_init(|| match config_tracing::init_tracing() {
        Ok(()) => Ok(()),
        Err(InitError::AlreadyInitialised) => Ok(()),
        Err(err) => Err(err),
    });

    if let Err(err) = result {
        warn!("failed to initialise tracing subscriber: {err}");
    }
}

/// Flushes any Chrome trace file opened by [`init_tracing`].
pub fn shutdown_tracing() {
    config_tracing::flush_chrome_trace();
}
