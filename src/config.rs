//! Configuration and limits for WebSocket clients and servers.

use std::time::Duration;

#[cfg(feature = "tls-rustls")]
use crate::tls::ClientTlsOptions;

/// Resource limits shared by clients and servers.
///
/// These bound the memory a single peer can make us hold before a frame or
/// an HTTP head is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of the HTTP upgrade head in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,

    /// Maximum wire size of one incoming frame, header included.
    ///
    /// A frame whose header announces more is refused before its payload is
    /// buffered. The default is above the largest 16-bit-length frame, so
    /// it only bites when lowered.
    ///
    /// Default: 128 KB (128 * 1024)
    pub max_buffered_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_handshake_size: 8192,
            max_buffered_bytes: 128 * 1024,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_handshake_size: usize, max_buffered_bytes: usize) -> Self {
        Self {
            max_handshake_size,
            max_buffered_bytes,
        }
    }

    /// Validate that an incoming frame fits the read buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_buffered_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_buffered_bytes {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_buffered_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Resource limits.
    pub limits: Limits,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Maximum time from starting the TCP connect to a validated upgrade.
    ///
    /// If `None`, the handshake may wait forever.
    /// Default: 30 seconds
    pub handshake_timeout: Option<Duration>,

    /// TLS settings used for `wss://` targets.
    ///
    /// Default: certificate verification disabled.
    #[cfg(feature = "tls-rustls")]
    pub tls: ClientTlsOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 8192,
            handshake_timeout: Some(Duration::from_secs(30)),
            #[cfg(feature = "tls-rustls")]
            tls: ClientTlsOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set or clear the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set TLS options for secure targets.
    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_tls(mut self, tls: ClientTlsOptions) -> Self {
        self.tls = tls;
        self
    }
}

/// Server configuration.
///
/// `secure`, `cert` and `key` only apply to [`WebSocketServer::bind`]; a
/// server built around an existing listener ignores them.
///
/// [`WebSocketServer::bind`]: crate::server::WebSocketServer::bind
#[derive(Clone)]
pub struct ServerConfig {
    /// Resource limits.
    pub limits: Limits,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Accept TLS connections.
    ///
    /// Default: false
    pub secure: bool,

    /// PEM-encoded certificate chain. A self-signed certificate is generated
    /// when `secure` is set and this is `None`.
    pub cert: Option<Vec<u8>>,

    /// PEM-encoded private key matching `cert`.
    pub key: Option<Vec<u8>>,

    /// Log registry changes (active connection count and ids).
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 8192,
            secure: false,
            cert: None,
            key: None,
            verbose: false,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("limits", &self.limits)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("secure", &self.secure)
            .field("cert", &self.cert.as_ref().map(|c| c.len()))
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl ServerConfig {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Serve over TLS.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Use the given PEM certificate chain and private key for TLS.
    #[must_use]
    pub fn with_identity(mut self, cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Enable registry diagnostics.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
