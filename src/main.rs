mod cli;
mod dispatcher;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use perfana::config::Config;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so tables and JSON on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.no_color || cli.json {
        colored::control::set_override(false);
    }

    let mut config = Config::load()?;
    if let Some(dir) = cli.offline {
        config.offline_prices_dir = Some(dir);
    }
    if cli.no_cache {
        config.no_cache = true;
    }
    debug!("Effective configuration: {:?}", config);

    let session = dispatcher::Session::open(config, cli.json)?;
    dispatcher::dispatch_command(cli.command, &session).await
}
