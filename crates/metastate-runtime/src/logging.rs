#![forbid(unsafe_code)]

//! Opt-in `tracing` subscriber for applications and examples.
//!
//! Library code only emits events; installing a subscriber is the
//! application's call. This helper installs a plain `fmt` subscriber filtered
//! by `RUST_LOG`, falling back to `info`. Combine with
//! `METASTATE_TRACE_DISPATCH=1` and `RUST_LOG=metastate_core=debug` to see
//! every dispatch pass.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install a global `fmt` subscriber.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
