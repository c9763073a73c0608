use clap::Parser;
use miner_snapshot::config::{ConnectionArgs, PollArgs};
use miner_snapshot::snapshot::{self, DEFAULT_MINER_PATTERN, DEFAULT_SCAN_COUNT};
use miner_snapshot::{logging, poll, Client, ConnectionConfig};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "miner-scan",
    version,
    about = "Print every miner hash whose key matches a pattern"
)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    poll: PollArgs,

    /// Glob pattern of the keys to read
    #[arg(long, default_value = DEFAULT_MINER_PATTERN)]
    pattern: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();
    let config = ConnectionConfig::from(&args.connection);

    let pattern = args.pattern.as_str();

    if args.poll.watch {
        let config = &config;
        poll::run_until(args.poll.period(), poll::ctrl_c(), move || {
            print_miners(config, pattern)
        })
        .await?;
    } else {
        print_miners(&config, pattern).await?;
    }

    Ok(())
}

/// Prints `<key> <fields>` for each matching key as soon as it is read.
async fn print_miners(config: &ConnectionConfig, pattern: &str) -> miner_snapshot::Result<()> {
    let mut client = Client::connect(config).await?;

    let count = snapshot::scan_hashes(&mut client, pattern, DEFAULT_SCAN_COUNT, |key, fields| {
        println!("{} {}", key, fields);
    })
    .await?;

    debug!(pattern, count, "scan finished");
    Ok(())
}
