use std::net::SocketAddr;
use std::process::Output;
use std::sync::Arc;

use miner_snapshot::server::{self, Store};
use miner_snapshot::snapshot::{collect_hashes, fetch_hash, scan_hashes};
use bytes::Bytes;
use miner_snapshot::{Client, ConnectionConfig, SnapshotError};
use tokio::net::TcpListener;
use tokio::process::Command;

/// Starts an in-memory store on an ephemeral port.
async fn start_store(password: Option<&str>) -> SocketAddr {
    serve(Arc::new(Store::new(4, password.map(str::to_string)))).await
}

/// Serves `store` on an ephemeral port; the caller keeps a handle to it.
async fn serve(store: Arc<Store>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::run(listener, store));
    addr
}

fn config(addr: SocketAddr) -> ConnectionConfig {
    ConnectionConfig::new(addr.ip().to_string(), addr.port())
}

/// A port nothing is listening on.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn seed_example_data(client: &mut Client) {
    client
        .hset("minerBoards", &[("rig01", "online"), ("rig02", "offline")])
        .await
        .unwrap();
    client.hset("eth:miners:1", &[("hashrate", "100")]).await.unwrap();
    client.hset("eth:miners:2", &[("hashrate", "90")]).await.unwrap();
    client.hset("eth:blocks:candidates", &[("height", "7")]).await.unwrap();
}

async fn run_bin(bin: &str, addr: SocketAddr, extra: &[&str]) -> Output {
    Command::new(bin)
        .arg("--ip")
        .arg(addr.ip().to_string())
        .arg("--port")
        .arg(addr.port().to_string())
        .args(extra)
        .env_remove("SNAPSHOT_REDIS_HOST")
        .env_remove("SNAPSHOT_REDIS_PORT")
        .env_remove("SNAPSHOT_REDIS_PASSWORD")
        .env("RUST_LOG", "info")
        .output()
        .await
        .unwrap()
}

fn sorted_lines(bytes: &[u8]) -> Vec<String> {
    let mut lines: Vec<String> = String::from_utf8_lossy(bytes).lines().map(str::to_string).collect();
    lines.sort();
    lines
}

#[tokio::test]
async fn named_hash_fetch_returns_every_field() {
    let addr = start_store(None).await;
    let mut client = Client::connect(&config(addr)).await.unwrap();
    seed_example_data(&mut client).await;

    let boards = fetch_hash(&mut client, "minerBoards").await.unwrap();
    assert_eq!(boards.len(), 2);
    assert_eq!(boards.get("rig01"), Some("online"));
    assert_eq!(boards.get("rig02"), Some("offline"));

    let missing = fetch_hash(&mut client, "noSuchHash").await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn pattern_scan_returns_only_matching_hashes() {
    let addr = start_store(None).await;
    let mut client = Client::connect(&config(addr)).await.unwrap();
    seed_example_data(&mut client).await;

    let mut found = collect_hashes(&mut client, "eth:miners:*", 100).await.unwrap();
    found.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].0, "eth:miners:1");
    assert_eq!(found[0].1.to_string(), r#"{"hashrate": "100"}"#);
    assert_eq!(found[1].0, "eth:miners:2");
    assert_eq!(found[1].1.to_string(), r#"{"hashrate": "90"}"#);

    let none = scan_hashes(&mut client, "btc:miners:*", 100, |_, _| panic!("no key should match"))
        .await
        .unwrap();
    assert_eq!(none, 0);
}

#[tokio::test]
async fn small_scan_pages_still_visit_every_key_once() {
    let addr = start_store(None).await;
    let mut client = Client::connect(&config(addr)).await.unwrap();
    for i in 0..25 {
        client
            .hset(&format!("eth:miners:{}", i), &[("hashrate", "1")])
            .await
            .unwrap();
        client.hset(&format!("eth:payments:{}", i), &[("amount", "1")]).await.unwrap();
    }

    let found = collect_hashes(&mut client, "eth:miners:*", 3).await.unwrap();
    let mut keys: Vec<&str> = found.iter().map(|(key, _)| key.as_str()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 25);
    assert_eq!(found.len(), 25);
}

#[tokio::test]
async fn reads_leave_the_store_unchanged() {
    let addr = start_store(None).await;
    let mut client = Client::connect(&config(addr)).await.unwrap();
    seed_example_data(&mut client).await;

    let first = collect_hashes(&mut client, "eth:*", 2).await.unwrap();
    let boards = fetch_hash(&mut client, "minerBoards").await.unwrap();

    assert_eq!(first, collect_hashes(&mut client, "eth:*", 2).await.unwrap());
    assert_eq!(boards, fetch_hash(&mut client, "minerBoards").await.unwrap());
}

#[tokio::test]
async fn password_and_database_come_from_config() {
    let addr = start_store(Some("s3cret")).await;

    let mut writer = Client::connect(&config(addr).with_password("s3cret").with_db(2))
        .await
        .unwrap();
    writer.hset("minerBoards", &[("rig07", "online")]).await.unwrap();

    let mut db0 = Client::connect(&config(addr).with_password("s3cret")).await.unwrap();
    assert!(fetch_hash(&mut db0, "minerBoards").await.unwrap().is_empty());

    let mut db2 = Client::connect(&config(addr).with_password("s3cret").with_db(2))
        .await
        .unwrap();
    let boards = fetch_hash(&mut db2, "minerBoards").await.unwrap();
    assert_eq!(boards.get("rig07"), Some("online"));
}

#[tokio::test]
async fn rejected_credential_is_a_connection_failure() {
    let addr = start_store(Some("s3cret")).await;

    let err = Client::connect(&config(addr).with_password("guess"))
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::Server(_)));
    assert!(err.is_connection_failure());

    // No credential at all: the connection opens but reads are refused.
    let mut anonymous = Client::connect(&config(addr)).await.unwrap();
    let err = fetch_hash(&mut anonymous, "minerBoards").await.unwrap_err();
    assert!(err.is_connection_failure());
}

#[tokio::test]
async fn unreachable_store_is_a_connection_failure() {
    let addr = closed_port().await;
    let err = Client::connect(&config(addr)).await.unwrap_err();
    assert!(matches!(err, SnapshotError::Io(_)));
    assert!(err.is_connection_failure());
}

#[tokio::test]
async fn boards_binary_prints_one_line_per_field() {
    let addr = start_store(None).await;
    let mut client = Client::connect(&config(addr)).await.unwrap();
    seed_example_data(&mut client).await;

    let out = run_bin(env!("CARGO_BIN_EXE_miner-boards"), addr, &[]).await;
    assert!(out.status.success());
    assert_eq!(sorted_lines(&out.stdout), ["rig01 online", "rig02 offline"]);
}

#[tokio::test]
async fn boards_binary_reports_failures_and_still_succeeds() {
    let addr = start_store(Some("s3cret")).await;

    let out = run_bin(env!("CARGO_BIN_EXE_miner-boards"), addr, &["--password", "guess"]).await;
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
    assert_eq!(String::from_utf8_lossy(&out.stderr).lines().count(), 1);

    let out = run_bin(env!("CARGO_BIN_EXE_miner-boards"), closed_port().await, &[]).await;
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
    assert_eq!(String::from_utf8_lossy(&out.stderr).lines().count(), 1);
}

#[tokio::test]
async fn scan_binary_prints_each_matching_key() {
    let addr = start_store(None).await;
    let mut client = Client::connect(&config(addr)).await.unwrap();
    seed_example_data(&mut client).await;

    let out = run_bin(env!("CARGO_BIN_EXE_miner-scan"), addr, &[]).await;
    assert!(out.status.success());
    assert_eq!(
        sorted_lines(&out.stdout),
        [
            r#"eth:miners:1 {"hashrate": "100"}"#,
            r#"eth:miners:2 {"hashrate": "90"}"#,
        ]
    );
}

#[tokio::test]
async fn scan_binary_fails_when_store_is_unreachable() {
    let out = run_bin(env!("CARGO_BIN_EXE_miner-scan"), closed_port().await, &[]).await;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[tokio::test]
async fn non_utf8_field_is_a_decode_error() {
    let store = Arc::new(Store::new(4, None));
    let mut session = store.session();
    store.execute(
        &mut session,
        &[
            Bytes::from_static(b"HSET"),
            Bytes::from_static(b"eth:miners:1"),
            Bytes::from_static(&[0xff, 0xfe]),
            Bytes::from_static(b"100"),
        ],
    );
    let addr = serve(store).await;

    let mut client = Client::connect(&config(addr)).await.unwrap();
    let err = client.hgetall("eth:miners:1").await.unwrap_err();
    assert!(matches!(err, SnapshotError::Decode(_)));
    assert!(!err.is_connection_failure());

    let out = run_bin(env!("CARGO_BIN_EXE_miner-scan"), addr, &[]).await;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[tokio::test]
async fn malformed_port_is_rejected_before_connecting() {
    let out = Command::new(env!("CARGO_BIN_EXE_miner-boards"))
        .args(["--port", "not-a-port"])
        .output()
        .await
        .unwrap();
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--port"));
}
