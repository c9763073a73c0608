use std::fmt;

use bytes::Bytes;
use mini_redis::{Connection, Frame};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::config::ConnectionConfig;
use crate::snapshot::{HashFields, HashStore, ScanPage};
use crate::{Result, SnapshotError};

/// A single connection to the store. Each command waits for its reply
/// before the next one is sent.
pub struct Client {
    connection: Connection,
}

impl fmt::Debug for Client {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Opens a connection, authenticates when a password is configured and
    /// switches to the configured logical database.
    #[instrument(skip(config), fields(addr = %config.addr(), db = config.db))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Client> {
        let socket = TcpStream::connect((config.host.as_str(), config.port)).await?;
        let mut client = Client {
            connection: Connection::new(socket),
        };

        if let Some(password) = &config.password {
            client.auth(password).await?;
        }
        if config.db != 0 {
            client.select(config.db).await?;
        }

        debug!("connected");
        Ok(client)
    }

    pub async fn ping(&mut self) -> Result<()> {
        let reply = self.request(command(["PING"])).await?;
        match reply {
            Frame::Simple(ref text) if text == "PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    pub async fn auth(&mut self, password: &str) -> Result<()> {
        self.request_ok("AUTH", command(["AUTH", password])).await
    }

    pub async fn select(&mut self, db: i64) -> Result<()> {
        let db = db.to_string();
        self.request_ok("SELECT", command(["SELECT", db.as_str()])).await
    }

    /// One `SCAN cursor MATCH pattern COUNT count` round trip.
    pub async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        let cursor = cursor.to_string();
        let count = count.to_string();
        let reply = self
            .request(command(["SCAN", cursor.as_str(), "MATCH", pattern, "COUNT", count.as_str()]))
            .await?;

        let (next, keys) = match reply {
            Frame::Array(mut parts) if parts.len() == 2 => {
                let keys = parts.pop();
                let next = parts.pop();
                (next, keys)
            }
            other => return Err(unexpected("SCAN", &other)),
        };

        let cursor = match next {
            Some(Frame::Bulk(data)) => std::str::from_utf8(&data)
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .ok_or_else(|| SnapshotError::Protocol("SCAN cursor is not a number".into()))?,
            Some(Frame::Integer(num)) => num,
            _ => return Err(SnapshotError::Protocol("SCAN reply has no cursor".into())),
        };

        let keys = match keys {
            Some(Frame::Array(entries)) => entries
                .into_iter()
                .map(bulk_to_string)
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(SnapshotError::Protocol("SCAN reply has no key list".into())),
        };

        Ok(ScanPage { cursor, keys })
    }

    /// All fields and values of the hash at `key`, decoded as UTF-8.
    pub async fn hgetall(&mut self, key: &str) -> Result<HashFields> {
        let reply = self.request(command(["HGETALL", key])).await?;

        let entries = match reply {
            Frame::Array(entries) => entries,
            Frame::Null => return Ok(HashFields::new()),
            other => return Err(unexpected("HGETALL", &other)),
        };
        if entries.len() % 2 != 0 {
            return Err(SnapshotError::Protocol(format!(
                "HGETALL returned an odd number of entries ({})",
                entries.len()
            )));
        }

        let mut fields = HashFields::new();
        let mut entries = entries.into_iter();
        while let (Some(field), Some(value)) = (entries.next(), entries.next()) {
            fields.insert(bulk_to_string(field)?, bulk_to_string(value)?);
        }
        Ok(fields)
    }

    /// Sets `pairs` on the hash at `key`. Returns how many fields were new.
    pub async fn hset(&mut self, key: &str, pairs: &[(&str, &str)]) -> Result<u64> {
        let mut parts = vec!["HSET", key];
        for &(field, value) in pairs {
            parts.push(field);
            parts.push(value);
        }

        match self.request(command(parts)).await? {
            Frame::Integer(added) => Ok(added),
            other => Err(unexpected("HSET", &other)),
        }
    }

    async fn request_ok(&mut self, name: &str, frame: Frame) -> Result<()> {
        match self.request(frame).await? {
            Frame::Simple(ref text) if text == "OK" => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }

    /// Sends `frame` and waits for the reply. Error replies become
    /// `SnapshotError::Server`.
    async fn request(&mut self, frame: Frame) -> Result<Frame> {
        self.connection.write_frame(&frame).await?;

        match self.connection.read_frame().await.map_err(SnapshotError::from)? {
            Some(Frame::Error(msg)) => Err(SnapshotError::Server(msg)),
            Some(reply) => Ok(reply),
            None => Err(SnapshotError::ConnectionReset),
        }
    }
}

impl HashStore for Client {
    async fn scan_page(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        self.scan(cursor, pattern, count).await
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashFields> {
        Client::hgetall(self, key).await
    }
}

/// A request is an array of bulk strings.
fn command<'a>(parts: impl IntoIterator<Item = &'a str>) -> Frame {
    Frame::Array(
        parts
            .into_iter()
            .map(|part| Frame::Bulk(Bytes::copy_from_slice(part.as_bytes())))
            .collect(),
    )
}

fn bulk_to_string(frame: Frame) -> Result<String> {
    match frame {
        Frame::Bulk(data) => Ok(String::from_utf8(data.to_vec())?),
        Frame::Simple(text) => Ok(text),
        other => Err(SnapshotError::Protocol(format!(
            "expected a bulk string, got `{}`",
            other
        ))),
    }
}

fn unexpected(command: &str, reply: &Frame) -> SnapshotError {
    SnapshotError::Protocol(format!("unexpected reply to {}: `{}`", command, reply))
}
