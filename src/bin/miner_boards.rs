use clap::Parser;
use miner_snapshot::config::{ConnectionArgs, PollArgs};
use miner_snapshot::snapshot::{self, DEFAULT_BOARDS_KEY};
use miner_snapshot::{logging, poll, Client, ConnectionConfig, HashFields};
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "miner-boards",
    version,
    about = "Print the fields of the miner boards hash"
)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    poll: PollArgs,

    /// Hash key to read
    #[arg(long, default_value = DEFAULT_BOARDS_KEY)]
    key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();
    let config = ConnectionConfig::from(&args.connection);

    let key = args.key.as_str();

    if args.poll.watch {
        let config = &config;
        poll::run_until(args.poll.period(), poll::ctrl_c(), move || async move {
            print_boards(config, key).await;
            Ok(())
        })
        .await?;
    } else {
        print_boards(&config, key).await;
    }

    Ok(())
}

/// Prints `<field> <value>` per line. A failed read is reported once on
/// stderr and prints nothing; it does not change the exit status.
async fn print_boards(config: &ConnectionConfig, key: &str) {
    match read_boards(config, key).await {
        Ok(fields) => {
            for (field, value) in &fields {
                println!("{} {}", field, value);
            }
        }
        Err(err) if err.is_connection_failure() => {
            error!(addr = %config.addr(), key, "cannot reach store: {}", err)
        }
        Err(err) => error!(key, "failed to read hash: {}", err),
    }
}

async fn read_boards(config: &ConnectionConfig, key: &str) -> miner_snapshot::Result<HashFields> {
    let mut client = Client::connect(config).await?;
    snapshot::fetch_hash(&mut client, key).await
}
