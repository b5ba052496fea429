//! Log subscriber setup shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber.
///
/// The default level is `info` (`debug` with `verbose`); `RUST_LOG`
/// overrides either. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .try_init();

    if result.is_err() {
        tracing::debug!("Log subscriber already installed");
    }
}
