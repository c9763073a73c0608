use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Diagnostics go to stderr so
/// stdout carries only snapshot output. `RUST_LOG` overrides the default
/// `info` level.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
