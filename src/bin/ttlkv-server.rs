//! ttlkv Server Binary

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use ttlkv::{Config, Server};

/// ttlkv server - in-memory key-value store with TTL
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Port number
    #[arg(short, long, default_value_t = 8082)]
    port: u16,

    /// Eviction sweep interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    sweep_interval_ms: u64,

    /// Store shard count (0 = 4 per CPU core)
    #[arg(long, default_value_t = 0)]
    shards: usize,

    /// Restore the store from this snapshot file before serving
    #[arg(long)]
    restore: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ttlkv=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = Config::default()
        .with_bind(&args.bind)
        .with_port(args.port)
        .with_sweep_interval(Duration::from_millis(args.sweep_interval_ms));
    if args.shards > 0 {
        config = config.with_shards(args.shards);
    }
    if let Some(path) = args.restore {
        config = config.with_restore_from(path);
    }

    info!(
        "Starting ttlkv server on {}:{} (sweep every {} ms)",
        args.bind, args.port, args.sweep_interval_ms
    );

    let server = Server::bind(config).await?;
    server
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("ttlkv server stopped");
    Ok(())
}
