//! pcc-server: printable character counting server.
//!
//! Usage: `pcc-server <PORT>`. On SIGINT the server finishes the client it
//! is serving, prints the histogram to stdout and exits 0. Fatal errors are
//! logged to stderr and exit 1 without a report.

use pcc::{Config, Histogram, Server, ServerError, Shutdown};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; stdout is reserved for the report
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!(
        listen = %config.listen,
        backlog = config.backlog,
        "Starting pcc server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let histogram = match runtime.block_on(serve(config)) {
        Ok(histogram) => histogram,
        Err(e) => {
            error!(error = %e, "Fatal error");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = print_report(&histogram) {
        error!(error = %e, "Failed to write report");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Register the interrupt watcher, then serve until it fires.
async fn serve(config: Config) -> Result<Histogram, ServerError> {
    let shutdown = Shutdown::new();
    shutdown.watch_interrupt().map_err(ServerError::Signal)?;

    let server = Server::bind(&config, shutdown)?;
    server.run().await
}

fn print_report(histogram: &Histogram) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    histogram.write_report(&mut out)?;
    out.flush()
}
