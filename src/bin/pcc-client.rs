//! pcc-client: send a file to a pcc server and print its printable count.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pcc-client")]
#[command(version)]
#[command(about = "Sends a file to a pcc server and prints its printable character count", long_about = None)]
struct CliArgs {
    /// Server IP address
    host: IpAddr,

    /// Server port
    port: u16,

    /// File to send
    file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let addr = SocketAddr::new(cli.host, cli.port);
    match pcc::client::send_file(addr, &cli.file).await {
        Ok(count) => {
            println!("# of printable characters: {count}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
