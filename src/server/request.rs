//! Plain HTTP requests that reach the listener without an `Upgrade` header.
//!
//! The server does not serve HTTP itself. Each such request is handed to the
//! application as an [`HttpRequest`] plus a [`Responder`] that owns the
//! connection.

use std::fmt;
use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::{Headers, RequestHead};

/// Byte stream a [`Responder`] can own.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// A parsed non-upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    head: RequestHead,
    peer: Option<SocketAddr>,
}

impl HttpRequest {
    pub(crate) fn new(head: RequestHead, peer: Option<SocketAddr>) -> Self {
        Self { head, peer }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.head.method
    }

    /// Request target as sent, query included.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.head.target
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.head.path()
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[must_use]
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    #[must_use]
    pub fn into_head(self) -> RequestHead {
        self.head
    }
}

/// Write side of a forwarded request.
///
/// Dropping it without responding closes the connection.
pub struct Responder {
    io: Box<dyn Io>,
    buffered: BytesMut,
}

impl Responder {
    pub(crate) fn new(io: Box<dyn Io>, buffered: BytesMut) -> Self {
        Self { io, buffered }
    }

    /// Write a complete response and close the connection.
    ///
    /// `Content-Length` and `Connection: close` are added after `headers`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    pub async fn respond(
        mut self,
        status: u16,
        reason: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<()> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", status, reason);
        for (name, value) in headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        head.push_str("Connection: close\r\n\r\n");

        self.io.write_all(head.as_bytes()).await?;
        self.io.write_all(body).await?;
        self.io.flush().await?;
        self.io.shutdown().await?;
        Ok(())
    }

    /// Take the raw stream and any body bytes read past the request head.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn Io>, BytesMut) {
        (self.io, self.buffered)
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("buffered", &self.buffered.len())
            .finish()
    }
}
