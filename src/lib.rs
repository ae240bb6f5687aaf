// Shared code for the BigQuery and Bigtable example binaries
pub mod application;
pub mod domain;
pub mod infrastructure;

/// Install the stderr tracing subscriber, `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
