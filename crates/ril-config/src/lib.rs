//! Shared runtime configuration: tracing subscriber setup and deterministic
//! seeding used by the rate invariance crates.

pub mod determinism;
pub mod tracing;
