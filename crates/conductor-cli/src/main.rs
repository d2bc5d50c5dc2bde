mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use conductor_core::paths;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_dir = match cli.dir.clone() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => paths::ensure_conductor_dir()?,
    };

    // Logs go to a file; stdout is reserved for JSON output
    let log_dir = paths::logs_dir_in(&base_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "conductor.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    commands::run(cli.command, &base_dir).await
}
