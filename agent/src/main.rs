//! update-agent: unattended self-update agent for a supervised server

use clap::Parser;
use tracing_subscriber::EnvFilter;

use update_agent::cli::Cli;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "update_agent=debug"
    } else {
        "update_agent=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
