#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Tracing subscriber setup for the trackfs workspace.
//!
//! Library crates instrument themselves with `tracing::debug!`/`trace!`;
//! the binary calls [`init`] once. The `TRACKFS_LOG` environment variable
//! takes an env-filter directive string and overrides the verbosity-derived
//! default.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an env-filter directive string.
pub const ENV_VAR: &str = "TRACKFS_LOG";

/// Maps the `-v`/`-q` verbosity counter to a default filter directive.
#[must_use]
pub fn directive_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. Returns whether this call installed it
/// (false if something else already did, e.g. a test harness).
pub fn init(verbosity: u8) -> bool {
    let filter = EnvFilter::try_from_env(ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(directive_for_verbosity(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_increasing_levels() {
        assert_eq!(directive_for_verbosity(0), "error");
        assert_eq!(directive_for_verbosity(1), "warn");
        assert_eq!(directive_for_verbosity(2), "info");
        assert_eq!(directive_for_verbosity(3), "debug");
        assert_eq!(directive_for_verbosity(9), "trace");
    }

    #[test]
    fn init_is_idempotent() {
        // Whichever call wins, the second must not panic.
        let _ = init(1);
        assert!(!init(2));
    }
}
