use std::string::FromUtf8Error;

use thiserror::Error;

/// Failures surfaced by the store client and the snapshot readers.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("store replied with an error: {0}")]
    Server(String),

    #[error("reply is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),
}

impl SnapshotError {
    /// True when the store could not be reached or refused our credential,
    /// as opposed to a reply we could not make sense of.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            SnapshotError::Io(_) | SnapshotError::ConnectionReset => true,
            SnapshotError::Server(msg) => {
                msg.starts_with("WRONGPASS")
                    || msg.starts_with("NOAUTH")
                    || msg.starts_with("ERR AUTH")
            }
            SnapshotError::Protocol(_) | SnapshotError::Decode(_) => false,
        }
    }
}

/// mini-redis reports every read failure as a boxed error; recover the I/O
/// cause when there is one.
impl From<mini_redis::Error> for SnapshotError {
    fn from(err: mini_redis::Error) -> SnapshotError {
        match err.downcast::<std::io::Error>() {
            Ok(io) => SnapshotError::Io(*io),
            Err(err) if err.to_string() == "connection reset by peer" => {
                SnapshotError::ConnectionReset
            }
            Err(err) => SnapshotError::Protocol(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejections_count_as_connection_failures() {
        let wrong = SnapshotError::Server("WRONGPASS invalid username-password pair".into());
        let missing = SnapshotError::Server("NOAUTH Authentication required.".into());
        assert!(wrong.is_connection_failure());
        assert!(missing.is_connection_failure());
    }

    #[test]
    fn io_errors_count_as_connection_failures() {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(SnapshotError::from(refused).is_connection_failure());
        assert!(SnapshotError::ConnectionReset.is_connection_failure());
    }

    #[test]
    fn mini_redis_errors_keep_their_cause() {
        let refused: mini_redis::Error =
            Box::new(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(matches!(SnapshotError::from(refused), SnapshotError::Io(_)));

        let reset: mini_redis::Error = "connection reset by peer".into();
        assert!(matches!(SnapshotError::from(reset), SnapshotError::ConnectionReset));

        let garbage: mini_redis::Error = "protocol error; invalid frame type byte `63`".into();
        assert!(matches!(SnapshotError::from(garbage), SnapshotError::Protocol(_)));
    }

    #[test]
    fn malformed_replies_are_not_connection_failures() {
        assert!(!SnapshotError::Protocol("bad".into()).is_connection_failure());
        assert!(!SnapshotError::Server("ERR unknown command 'hgetall'".into()).is_connection_failure());

        let decode = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        assert!(!SnapshotError::from(decode).is_connection_failure());
    }
}
