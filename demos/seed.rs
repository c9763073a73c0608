use std::time::Duration;

use miner_snapshot::{Client, ConnectionConfig};
use tokio::time::sleep;

/// Fills a local store with sample data: the `minerBoards` hash and miner
/// hashes `eth:miners:1` - `eth:miners:9`.
///
/// Start the store first: cargo run --bin snapshot-store
/// Then: cargo run --example seed
#[tokio::main]
async fn main() -> miner_snapshot::Result<()> {
    // Open a connection to the store address.
    let mut client = Client::connect(&ConnectionConfig::default()).await?;
    client.ping().await?;

    for i in 1..10 {
        sleep(Duration::from_millis(100)).await;

        let rig = format!("rig{:02}", i);
        let state = if i % 3 == 0 { "offline" } else { "online" };
        client.hset("minerBoards", &[(rig.as_str(), state)]).await?;

        let hashrate = (i * 10).to_string();
        let key = format!("eth:miners:{}", i);
        client
            .hset(&key, &[("hashrate", hashrate.as_str()), ("rig", rig.as_str())])
            .await?;
        println!("seeded {} and minerBoards[{}]; index: {:?}", key, rig, i);
    }

    Ok(())
}
