use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use t12_ledger::cli::Cli;
use t12_ledger::dispatcher;

fn main() -> Result<()> {
    // Logs go to stderr so --json output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.no_color || cli.json {
        colored::control::set_override(false);
    }

    dispatcher::dispatch(cli)
}
