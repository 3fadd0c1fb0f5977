//! Installs a `tracing-subscriber` `fmt` layer honoring `OCIPACK_LOG`
//! (falling back to `RUST_LOG`), matching the `tracing` +
//! `tracing-subscriber` pairing the rest of the workspace instruments with.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_env("OCIPACK_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
