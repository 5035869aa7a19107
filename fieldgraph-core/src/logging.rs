//! Logging setup.
//!
//! The library only emits `tracing` events under the `fieldgraph_core`
//! target. Hosts usually install their own subscriber; [`init_logging`] is
//! for binaries and tests that just want resolver output on stderr.
//!
//! Directives come from `FIELDGRAPH_LOG` when it is set (same syntax as
//! `RUST_LOG`). Otherwise the given level applies to this crate and every
//! other target stays at `warn`.

use std::sync::Once;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "FIELDGRAPH_LOG";

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

static INIT: Once = Once::new();

/// Default directives: `level` for resolver events, `warn` for the rest.
pub fn default_directives(level: LevelFilter) -> String {
    format!("warn,{CRATE_TARGET}={level}")
}

/// Filter built from `FIELDGRAPH_LOG`, or from `level` when unset.
/// Malformed directives are skipped rather than rejected.
pub fn env_filter(level: LevelFilter) -> EnvFilter {
    let directives = std::env::var(LOG_ENV)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| default_directives(level));
    EnvFilter::builder().parse_lossy(directives)
}

/// Install a global compact subscriber. Only the first call has any effect,
/// and a subscriber installed by the host is left alone.
pub fn init_logging(level: LevelFilter) {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter(level))
            .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_scope_the_level_to_this_crate() {
        assert_eq!(
            default_directives(LevelFilter::DEBUG).to_lowercase(),
            "warn,fieldgraph_core=debug"
        );
        assert_eq!(default_directives(LevelFilter::OFF).to_lowercase(), "warn,fieldgraph_core=off");
    }

    #[test]
    fn default_directives_parse_into_a_filter() {
        let filter = EnvFilter::builder().parse_lossy(default_directives(LevelFilter::DEBUG));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let quiet = EnvFilter::builder().parse_lossy(default_directives(LevelFilter::OFF));
        assert_eq!(quiet.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn levels_parse_from_names() {
        assert_eq!("off".parse::<LevelFilter>().ok(), Some(LevelFilter::OFF));
        assert_eq!("Debug".parse::<LevelFilter>().ok(), Some(LevelFilter::DEBUG));
        assert!("loud".parse::<LevelFilter>().is_err());
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LevelFilter::OFF);
        init_logging(LevelFilter::DEBUG);
    }
}
