//! RESP2 frames as read and written by the store server.
//!
//! The readers use `mini_redis::Frame`. The server needs its own type because
//! a `SCAN` reply is an array nested inside an array, which
//! `mini_redis::Connection` cannot write.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Deepest array nesting accepted from a peer.
pub const MAX_DEPTH: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough data buffered to parse a whole frame.
    Incomplete,
    /// The buffered bytes can never become a valid frame.
    Invalid(String),
}

impl Frame {
    /// Reads one frame from `src`, leaving the cursor just past it.
    ///
    /// Returns `FrameError::Incomplete` when `src` ends before the frame does;
    /// the caller should buffer more bytes and try again from the start.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, FrameError> {
        Frame::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, FrameError> {
        match get_u8(src)? {
            b'+' => {
                let line = get_line(src)?.to_vec();
                let text = String::from_utf8(line)
                    .map_err(|_| FrameError::Invalid("simple string is not UTF-8".into()))?;
                Ok(Frame::Simple(text))
            }
            b'-' => {
                let line = get_line(src)?.to_vec();
                let text = String::from_utf8(line)
                    .map_err(|_| FrameError::Invalid("error string is not UTF-8".into()))?;
                Ok(Frame::Error(text))
            }
            b':' => Ok(Frame::Integer(get_decimal(src)?)),
            b'$' => {
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(Frame::Null);
                }
                let len = usize::try_from(len)
                    .map_err(|_| FrameError::Invalid(format!("invalid bulk length {}", len)))?;

                // Payload plus the trailing CRLF.
                if src.remaining() < len + 2 {
                    return Err(FrameError::Incomplete);
                }
                if &src.chunk()[len..len + 2] != b"\r\n" {
                    return Err(FrameError::Invalid("bulk string not terminated by CRLF".into()));
                }
                let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                src.advance(len + 2);
                Ok(Frame::Bulk(data))
            }
            b'*' => {
                if depth >= MAX_DEPTH {
                    return Err(FrameError::Invalid(format!(
                        "arrays nested deeper than {}",
                        MAX_DEPTH
                    )));
                }
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(Frame::Null);
                }
                let len = usize::try_from(len)
                    .map_err(|_| FrameError::Invalid(format!("invalid array length {}", len)))?;

                let mut entries = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    entries.push(Frame::parse_nested(src, depth + 1)?);
                }
                Ok(Frame::Array(entries))
            }
            other => Err(FrameError::Invalid(format!(
                "invalid frame type byte `{}`",
                other.escape_ascii()
            ))),
        }
    }

    /// Appends the wire encoding of this frame to `dst`. Nested arrays are
    /// written depth first.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(text) => {
                dst.put_u8(b'+');
                dst.put_slice(text.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(text) => {
                dst.put_u8(b'-');
                dst.put_slice(text.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(val) => {
                dst.put_u8(b':');
                dst.put_slice(val.to_string().as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put_slice(data.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(entries) => {
                dst.put_u8(b'*');
                dst.put_slice(entries.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                for entry in entries {
                    entry.encode(dst);
                }
            }
        }
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, FrameError> {
    if !src.has_remaining() {
        return Err(FrameError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], FrameError> {
    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;
    let end = buf.len().saturating_sub(1);

    for i in start..end {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }

    Err(FrameError::Incomplete)
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, FrameError> {
    let line = get_line(src)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| FrameError::Invalid(format!("invalid integer {:?}", line.escape_ascii().to_string())))
}
