//! Buffered frame reader/writer over an async byte stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Frame pump for one upgraded socket.
///
/// Incoming bytes accumulate in a read buffer until a whole frame is present,
/// so a frame split across TCP reads is decoded once it completes, and several
/// frames arriving in one read are returned one by one.
pub struct FramedSocket<T> {
    io: T,
    read_buf: BytesMut,
    read_chunk: usize,
    limits: Limits,
}

impl<T> FramedSocket<T> {
    /// Wrap an upgraded stream.
    #[must_use]
    pub fn new(io: T, limits: Limits, read_buffer_size: usize) -> Self {
        let read_chunk = read_buffer_size.max(1024);
        Self {
            io,
            read_buf: BytesMut::with_capacity(read_chunk),
            read_chunk,
            limits,
        }
    }

    /// Seed the read buffer with bytes that arrived together with the
    /// upgrade head.
    #[must_use]
    pub fn with_buffered(mut self, leftover: &[u8]) -> Self {
        self.read_buf.extend_from_slice(leftover);
        self
    }

    /// Number of received bytes not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Get a reference to the underlying stream.
    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> FramedSocket<T> {
    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream; an incomplete
    /// trailing frame is discarded. Dropping the future between reads loses
    /// no data, so this can sit in a `select!` arm.
    ///
    /// # Errors
    ///
    /// - `Error::PayloadTooLarge` for a 64-bit payload length
    /// - `Error::FrameTooLarge` if a non-close frame exceeds
    ///   `Limits::max_buffered_bytes`
    /// - `Error::Io` on read failure
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if !self.read_buf.is_empty() {
                match Frame::parse(&self.read_buf) {
                    Ok((frame, consumed)) => {
                        // A close frame claims the whole buffer; what follows it is ignored.
                        if frame.opcode != OpCode::Close {
                            self.limits.check_buffered_size(consumed)?;
                        }
                        self.read_buf.advance(consumed);
                        return Ok(Some(frame));
                    }
                    Err(Error::Truncated { needed }) => {
                        self.limits
                            .check_buffered_size(self.read_buf.len() + needed)?;
                    }
                    Err(e) => return Err(e),
                }
            }

            self.read_buf.reserve(self.read_chunk);
            if self.io.read_buf(&mut self.read_buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Write already-encoded frame bytes and flush them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` on write failure.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.io.write_all(bytes).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
