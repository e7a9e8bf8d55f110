//! Global subscriber for the rate invariance crates: an `EnvFilter` driven by
//! `RUST_LOG` (default `info`), a fmt layer, and an optional Chrome trace file
//! selected with `RIL_TRACE_CHROME`.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_CHROME_TRACE: &str = "RIL_TRACE_CHROME";
const DEFAULT_FILTER: &str = "info";

static INSTALLED: AtomicBool = AtomicBool::new(false);
static CHROME_GUARD: Mutex<Option<FlushGuard>> = Mutex::new(None);

/// Installs the global subscriber. Only the first call does any work.
pub fn init_tracing() -> Result<(), InitError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Err(InitError::AlreadyInitialised);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stdout().is_terminal());
    let chrome_layer = chrome_trace_path()?.map(|path| {
        let (layer, guard) = ChromeLayerBuilder::new()
            .file(path)
            .include_args(true)
            .build();
        if let Ok(mut slot) = CHROME_GUARD.lock() {
            *slot = Some(guard);
        }
        layer
    });

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(chrome_layer)
        .try_init()
        .map_err(InitError::Install)
}

/// Writes out and closes the Chrome trace, if one is open.
pub fn flush_chrome_trace() {
    if let Ok(mut slot) = CHROME_GUARD.lock() {
        drop(slot.take());
    }
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var(ENV_CHROME_TRACE) {
        Ok(raw) => Ok(non_blank_path(&raw)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

fn non_blank_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read RIL_TRACE_CHROME: {0}")]
    Env(std::env::VarError),
    #[error("failed to install global subscriber: {0}")]
    Install(tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_chrome_path_disables_the_trace() {
        assert_eq!(non_blank_path("   "), None);
        assert_eq!(
            non_blank_path(" /tmp/ril.json\n"),
            Some(PathBuf::from("/tmp/ril.json"))
        );
    }

    #[test]
    fn second_install_reports_already_initialised() {
        let first = init_tracing();
        assert!(!matches!(first, Err(InitError::AlreadyInitialised)));
        assert!(matches!(
            init_tracing(),
            Err(InitError::AlreadyInitialised)
        ));
        flush_chrome_trace();
    }
}
