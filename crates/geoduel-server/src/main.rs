mod connection;
mod handler;
mod registry;
mod room;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use geoduel_common::location::LocationCatalog;

/// GeoDuel Server - head-to-head geography guessing game server
#[derive(Parser, Debug)]
#[command(name = "geoduel-server", version, about)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:9876")]
    bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, default_value_t = 100)]
    max_connections: usize,

    /// JSON file with the location catalog (defaults to the built-in set)
    #[arg(short, long)]
    locations: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoduel_server=debug,geoduel_common=debug".into()),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args.bind.parse()?;

    let catalog = match &args.locations {
        Some(path) => LocationCatalog::from_file(path)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?,
        None => LocationCatalog::builtin(),
    };

    tracing::info!(
        "Starting geoduel server on {} (max {} connections, {} locations)",
        addr,
        args.max_connections,
        catalog.len()
    );
    server::run(addr, args.max_connections, catalog).await
}
