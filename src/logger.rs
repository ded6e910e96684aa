//! `tracing` subscriber setup for programs that drive the optimizer.
//!
//! The crate only emits events. Iteration tables go out at `DEBUG`, readiness
//! problems and non-descent directions at `WARN`.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

/// Install the subscriber at `INFO`. See [`init_logger_with_level`].
pub fn init_logger() -> bool {
    init_logger_with_level(Level::INFO)
}

/// Install a compact `fmt` subscriber, `default_level` unless `RUST_LOG`
/// says otherwise (`RUST_LOG=graphopt=debug` shows the iteration table).
///
/// Returns `false` when a global subscriber was already installed.
///
/// ```no_run
/// graphopt::init_logger_with_level(tracing::Level::DEBUG);
/// ```
pub fn init_logger_with_level(default_level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_timer(SystemTime)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

fn filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}
