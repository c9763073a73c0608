use std::fmt;
use std::time::Duration;

use clap::Args;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Where the store lives and how to log into it. Built once per run.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index selected after connecting.
    pub db: i64,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> ConnectionConfig {
        ConnectionConfig {
            host: host.into(),
            port,
            password: None,
            db: 0,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> ConnectionConfig {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> ConnectionConfig {
        self.db = db;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .finish()
    }
}

/// Connection flags shared by the reader binaries.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Store host name or IP address
    #[arg(long, env = "SNAPSHOT_REDIS_HOST", default_value = DEFAULT_HOST)]
    pub ip: String,

    /// Store port
    #[arg(long, env = "SNAPSHOT_REDIS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Password sent with AUTH after connecting
    #[arg(long, env = "SNAPSHOT_REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Logical database index
    #[arg(long, default_value_t = 0)]
    pub db: i64,
}

impl From<&ConnectionArgs> for ConnectionConfig {
    fn from(args: &ConnectionArgs) -> ConnectionConfig {
        ConnectionConfig {
            host: args.ip.clone(),
            port: args.port,
            password: args.password.clone(),
            db: args.db,
        }
    }
}

/// Polling flags shared by the reader binaries.
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Seconds between snapshots when watching
    #[arg(
        short,
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Keep taking snapshots every interval until interrupted
    #[arg(long)]
    pub watch: bool,
}

impl PollArgs {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}
