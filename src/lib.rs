pub mod config;
pub mod sheet; // Spreadsheet tables (xlsx in/out)
pub mod rules; // ASIL / Security decision table
pub mod xml; // Generic RDF/XML mapping
pub mod qm; // QM server session, fetch and update pipelines
pub mod watermark; // PDF watermark and footer stamping

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// built-in filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("{} v{} starting", config::APP_NAME, config::APP_VERSION);
}
