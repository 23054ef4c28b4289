//! # Logging Setup
//!
//! Installs the process-wide `tracing` subscriber for hosts that do not
//! bring their own.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=tally=trace` - Show trace for tally crates only
//! - Default: [`DEFAULT_FILTER`]

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info,tally=debug,sqlx=warn";

/// Installs a fmt subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already set, in which case
/// nothing changes. Safe to call more than once.
pub fn init_tracing(default_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(None);
        assert!(!init_tracing(Some("debug")));
    }
}
