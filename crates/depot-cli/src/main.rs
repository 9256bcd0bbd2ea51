use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(&cli);
    commands::run_command(cli).await
}

/// `RUST_LOG` wins; otherwise `--verbose` or `--log-level`. Logs go to stderr
/// so `--format json` output on stdout stays machine-readable.
fn init_tracing(cli: &cli::Cli) {
    let fallback = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
