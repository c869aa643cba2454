mod cmd;
mod config;
mod error;

use clap::Parser;
use config::Cli;

#[tokio::main]
async fn main() {
    // stdout carries protocol messages, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cmd::serve::run(cli).await {
        tracing::error!(error = %e, "kafka-node failed");
        std::process::exit(1);
    }
}
