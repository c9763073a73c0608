//! In-memory hash store speaking the Redis protocol.
//!
//! Serves the commands the snapshot readers issue plus `HSET`/`DEL`/`KEYS`
//! for seeding, so the readers can be run against a local process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::frame::Frame;
use crate::glob::glob_match;
use crate::Result;

/// Number of logical databases selectable with `SELECT`.
pub const DATABASES: usize = 16;

/// Unfinished `SCAN` cursors kept before the oldest are forgotten.
pub const MAX_OPEN_CURSORS: usize = 1024;

type Hash = BTreeMap<Bytes, Bytes>;
type ShardedDb = DashMap<Bytes, Hash>;

pub struct Store {
    dbs: Vec<ShardedDb>,
    password: Option<String>,
    /// Open `SCAN` cursors, each mapped to the last key it examined.
    cursors: Mutex<BTreeMap<u64, Bytes>>,
    next_cursor: AtomicU64,
}

/// Per-connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    db: usize,
    authenticated: bool,
}

impl Store {
    /// `num_shards` is rounded up to a power of two, minimum two.
    pub fn new(num_shards: usize, password: Option<String>) -> Store {
        let shards = num_shards.max(2).next_power_of_two();
        let dbs = (0..DATABASES)
            .map(|_| DashMap::with_capacity_and_shard_amount(0, shards))
            .collect();
        Store {
            dbs,
            password,
            cursors: Mutex::new(BTreeMap::new()),
            next_cursor: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> Session {
        Session {
            db: 0,
            authenticated: self.password.is_none(),
        }
    }

    /// Runs one command and returns its reply. `args[0]` is the command name.
    pub fn execute(&self, session: &mut Session, args: &[Bytes]) -> Frame {
        let Some((name, rest)) = args.split_first() else {
            return Frame::Error("ERR empty command".into());
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        if !session.authenticated && name != "AUTH" && name != "PING" {
            return Frame::Error("NOAUTH Authentication required.".into());
        }

        match name.as_str() {
            "PING" => match rest {
                [] => Frame::Simple("PONG".into()),
                [msg] => Frame::Bulk(msg.clone()),
                _ => wrong_arity(&name),
            },
            "AUTH" => self.auth(session, rest),
            "SELECT" => match rest {
                [index] => match parse_int(index) {
                    Some(db) if db < DATABASES as u64 => {
                        session.db = db as usize;
                        Frame::Simple("OK".into())
                    }
                    Some(_) => Frame::Error("ERR DB index is out of range".into()),
                    None => not_an_integer(),
                },
                _ => wrong_arity(&name),
            },
            "SCAN" => self.scan(session.db, rest),
            "KEYS" => match rest {
                [pattern] => Frame::Array(
                    self.sorted_keys(session.db)
                        .into_iter()
                        .filter(|key| glob_match(pattern, key))
                        .map(Frame::Bulk)
                        .collect(),
                ),
                _ => wrong_arity(&name),
            },
            "HSET" => {
                if rest.len() < 3 || rest.len() % 2 == 0 {
                    return wrong_arity(&name);
                }
                let mut hash = self.dbs[session.db].entry(rest[0].clone()).or_default();
                let mut added = 0;
                for pair in rest[1..].chunks(2) {
                    if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                        added += 1;
                    }
                }
                Frame::Integer(added)
            }
            "HGETALL" => match rest {
                [key] => {
                    let entries = match self.dbs[session.db].get(key) {
                        Some(hash) => hash
                            .iter()
                            .flat_map(|(field, value)| {
                                [Frame::Bulk(field.clone()), Frame::Bulk(value.clone())]
                            })
                            .collect(),
                        None => Vec::new(),
                    };
                    Frame::Array(entries)
                }
                _ => wrong_arity(&name),
            },
            "DEL" => {
                if rest.is_empty() {
                    return wrong_arity(&name);
                }
                let removed = rest
                    .iter()
                    .filter(|key| self.dbs[session.db].remove(*key).is_some())
                    .count();
                Frame::Integer(removed as i64)
            }
            _ => Frame::Error(format!("ERR unknown command '{}'", name.to_ascii_lowercase())),
        }
    }

    fn auth(&self, session: &mut Session, rest: &[Bytes]) -> Frame {
        let supplied = match rest {
            [password] => password,
            [user, password] if &user[..] == b"default" => password,
            [_, _] => return wrong_pass(),
            _ => return wrong_arity("AUTH"),
        };

        match &self.password {
            None => Frame::Error(
                "ERR AUTH <password> called without any password configured for the default user. \
                 Are you sure your configuration is correct?"
                    .into(),
            ),
            Some(expected) if expected.as_bytes() == &supplied[..] => {
                session.authenticated = true;
                Frame::Simple("OK".into())
            }
            Some(_) => wrong_pass(),
        }
    }

    /// `SCAN cursor [MATCH pattern] [COUNT count]`. Keys are walked in sorted
    /// order; `COUNT` keys are examined per call and `MATCH` filters the
    /// examined keys.
    ///
    /// A non-zero cursor names the last key examined by the previous call, so
    /// the walk resumes strictly after it even when keys were added or
    /// deleted in between. Every key present for the whole walk is returned.
    fn scan(&self, db: usize, rest: &[Bytes]) -> Frame {
        let Some((cursor, mut options)) = rest.split_first() else {
            return wrong_arity("SCAN");
        };
        let Some(cursor) = parse_int(cursor) else {
            return Frame::Error("ERR invalid cursor".into());
        };

        let mut pattern: Option<&Bytes> = None;
        let mut count = 10;
        while let [option, value, remaining @ ..] = options {
            if option.eq_ignore_ascii_case(b"MATCH") {
                pattern = Some(value);
            } else if option.eq_ignore_ascii_case(b"COUNT") {
                match parse_int(value) {
                    Some(n) if n >= 1 => count = n as usize,
                    _ => return Frame::Error("ERR syntax error".into()),
                }
            } else {
                return Frame::Error("ERR syntax error".into());
            }
            options = remaining;
        }
        if !options.is_empty() {
            return Frame::Error("ERR syntax error".into());
        }

        let keys = self.sorted_keys(db);
        let start = if cursor == 0 {
            0
        } else {
            match self.take_cursor(cursor) {
                Some(last) => keys.partition_point(|key| *key <= last),
                None => return Frame::Error("ERR invalid cursor".into()),
            }
        };
        let end = start.saturating_add(count).min(keys.len());
        let next = if end >= keys.len() {
            0
        } else {
            self.open_cursor(keys[end - 1].clone())
        };

        let page = keys[start..end]
            .iter()
            .filter(|key| pattern.map_or(true, |pattern| glob_match(pattern, key)))
            .map(|key| Frame::Bulk(key.clone()))
            .collect();

        Frame::Array(vec![
            Frame::Bulk(Bytes::from(next.to_string())),
            Frame::Array(page),
        ])
    }

    fn take_cursor(&self, cursor: u64) -> Option<Bytes> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|err| err.into_inner());
        cursors.remove(&cursor)
    }

    fn open_cursor(&self, last: Bytes) -> u64 {
        let id = self.next_cursor.fetch_add(1, Ordering::Relaxed);
        let mut cursors = self.cursors.lock().unwrap_or_else(|err| err.into_inner());
        cursors.insert(id, last);
        while cursors.len() > MAX_OPEN_CURSORS {
            cursors.pop_first();
        }
        id
    }

    fn sorted_keys(&self, db: usize) -> Vec<Bytes> {
        let mut keys: Vec<Bytes> = self.dbs[db].iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

/// Accepts connections forever, serving each one on its own task.
///
/// To run the store: cargo run --bin snapshot-store
pub async fn run(listener: TcpListener, store: Arc<Store>) -> Result<()> {
    loop {
        // The second item contains the IP and port of the new connection.
        let (socket, peer) = listener.accept().await?;
        // Clone the handle to the store.
        let store = store.clone();

        debug!(%peer, "accepted");
        tokio::spawn(async move {
            if let Err(err) = process(socket, store).await {
                warn!(%peer, "connection error: {}", err);
            }
        });
    }
}

async fn process(socket: TcpStream, store: Arc<Store>) -> Result<()> {
    let mut connection = Connection::new(socket);
    let mut session = store.session();

    while let Some(frame) = connection.read_frame().await? {
        let response = match command_args(frame) {
            Ok(args) => store.execute(&mut session, &args),
            Err(msg) => Frame::Error(msg),
        };

        // Write the response to the client
        connection.write_frame(&response).await?;
    }

    debug!("client disconnected");
    Ok(())
}

fn command_args(frame: Frame) -> std::result::Result<Vec<Bytes>, String> {
    let Frame::Array(parts) = frame else {
        return Err("ERR Protocol error: expected an array of bulk strings".into());
    };
    parts
        .into_iter()
        .map(|part| match part {
            Frame::Bulk(data) => Ok(data),
            Frame::Simple(text) => Ok(Bytes::from(text)),
            _ => Err("ERR Protocol error: expected an array of bulk strings".to_string()),
        })
        .collect()
}

fn parse_int(src: &[u8]) -> Option<u64> {
    std::str::from_utf8(src).ok()?.parse().ok()
}

fn wrong_arity(name: &str) -> Frame {
    Frame::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn wrong_pass() -> Frame {
    Frame::Error("WRONGPASS invalid username-password pair or user is disabled.".into())
}

fn not_an_integer() -> Frame {
    Frame::Error("ERR value is not an integer or out of range".into())
}
