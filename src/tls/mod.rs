//! TLS support for secure WebSocket (`wss://`) connections.
//!
//! The rustls backend lives behind the `tls-rustls` feature (on by default).
//! [`MaybeTlsStream`] is always available so clients and servers can carry
//! one stream type whether or not TLS is compiled in.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[cfg(feature = "tls-rustls")]
mod rustls_impl;

#[cfg(feature = "tls-rustls")]
pub use rustls_impl::{
    ClientTlsOptions, TlsAcceptor, TlsConnector, TlsError, certs_from_pem,
    client_config_with_webpki_roots, insecure_client_config, load_certs_from_file,
    load_private_key_from_file, private_key_from_pem, self_signed_server_config, server_config,
    server_config_from_pem,
};

/// A transport that is either plain or wrapped in TLS.
pub enum MaybeTlsStream<S> {
    Plain(S),
    #[cfg(feature = "tls-rustls")]
    ClientTls(Box<tokio_rustls::client::TlsStream<S>>),
    #[cfg(feature = "tls-rustls")]
    ServerTls(Box<tokio_rustls::server::TlsStream<S>>),
}

impl<S> MaybeTlsStream<S> {
    /// Whether the stream is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        !matches!(self, MaybeTlsStream::Plain(_))
    }
}

impl<S> std::fmt::Debug for MaybeTlsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaybeTlsStream::Plain(_) => write!(f, "MaybeTlsStream::Plain"),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ClientTls(_) => write!(f, "MaybeTlsStream::ClientTls"),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ServerTls(_) => write!(f, "MaybeTlsStream::ServerTls"),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ClientTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ServerTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ClientTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ServerTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ClientTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ServerTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ClientTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::ServerTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
