use std::io::{self, Cursor};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::frame::{Frame, FrameError};
use crate::{Result, SnapshotError};

/// Server side of a client connection: reads requests and writes replies,
/// including nested arrays.
///
/// Reads are buffered until a whole frame is available; writes go through a
/// `BufWriter` and are flushed once per frame.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Waits for the next frame. `Ok(None)` means the peer closed the stream
    /// cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                // A close with bytes still buffered cut a frame in half.
                if self.buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err(SnapshotError::ConnectionReset);
                }
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>> {
        let mut buf = Cursor::new(&self.buffer[..]);

        match Frame::parse(&mut buf) {
            Ok(frame) => {
                let len = buf.position() as usize;
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            Err(FrameError::Incomplete) => Ok(None),
            Err(FrameError::Invalid(msg)) => Err(SnapshotError::Protocol(msg)),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let mut out = BytesMut::new();
        frame.encode(&mut out);

        self.stream.write_all(&out).await?;
        self.stream.flush().await
    }
}
