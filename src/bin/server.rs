use std::sync::Arc;

use clap::Parser;
use miner_snapshot::logging;
use miner_snapshot::server::{self, Store};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "snapshot-store",
    version,
    about = "In-memory hash store speaking the Redis protocol"
)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:6379")]
    bind: String,

    /// Require clients to AUTH with this password
    #[arg(long, env = "SNAPSHOT_REDIS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Shards per database, rounded up to a power of two
    #[arg(long, default_value_t = 16)]
    shards: usize,
}

/// To run this server: cargo run --bin snapshot-store
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    // Bind the listener to the address
    let listener = TcpListener::bind(&args.bind).await?;
    info!(addr = %listener.local_addr()?, shards = args.shards, "listening");

    let store = Arc::new(Store::new(args.shards, args.password));
    server::run(listener, store).await?;
    Ok(())
}
