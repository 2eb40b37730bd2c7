//! Logging setup using the `tracing` ecosystem.
//!
//! The server and the CORS driver log through `tracing` macros; binaries and
//! test suites pick a subscriber here. `RUST_LOG` overrides the default
//! filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "probe_server=info,probe_cors=info,probe_browser=info";

/// Filter used with `verbose`.
const VERBOSE_FILTER: &str = "probe_server=debug,probe_cors=debug,probe_browser=debug";

/// Initialize the global tracing subscriber.
///
/// Call once at program start. Panics if a global subscriber is already set;
/// use [`init_test_logging`] from tests.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging for probe crates
/// * `no_color` - Disable ANSI colors
pub fn init_logging(verbose: bool, no_color: bool) {
    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(!no_color)
                .compact(),
        )
        .init();
}

/// Installs a test-friendly subscriber if none is installed yet.
///
/// Output goes through the libtest capture writer so it only shows up for
/// failing tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter(false))
        .with(fmt::layer().with_test_writer().with_ansi(false).compact())
        .try_init();
}

fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("still alive");
    }

    #[test]
    fn filters_parse() {
        let _ = EnvFilter::new(DEFAULT_FILTER);
        let _ = EnvFilter::new(VERBOSE_FILTER);
    }
}
