use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable consulted after `RUST_LOG`.
pub const LOG_ENV: &str = "CERT_ARCHIVER_LOGLEVEL";

/// Initialize stderr logging. Stdout is left to the progress lines.
pub fn initialize_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| format!("{}={default_level}", env!("CARGO_CRATE_NAME")));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    tracing_subscriber::registry().with(stderr_layer).init();
}
