use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity level; RUST_LOG wins when set
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "acme_harness=info",
        1 => "acme_harness=debug",
        _ => "acme_harness=trace,reqwest=debug",
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
