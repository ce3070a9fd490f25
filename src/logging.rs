//! Log subscriber setup for hosts embedding the allocator
//!
//! The library only emits `tracing` events. Binaries and test harnesses call
//! [`init`] once to get them on stdout, filtered by `RUST_LOG` on top of the
//! given default level.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, which is the
/// common case when several tests race to initialise logging.
pub fn init(level: LevelFilter, ansi: bool) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stdout).with_ansi(ansi))
        .with(filter)
        .try_init()
        .is_ok()
}

/// Same as [`init`] but emits one JSON object per event
pub fn init_json(level: LevelFilter) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().json().with_writer(std::io::stdout))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init(LevelFilter::WARN, false);
        assert!(!init(LevelFilter::WARN, false));
        assert!(!init_json(LevelFilter::WARN));
    }
}
