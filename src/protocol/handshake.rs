//! WebSocket opening handshake (RFC 6455 section 4).
//!
//! Both sides derive the accept key with [`compute_accept_key`]. The client
//! builds its upgrade request with [`ClientHandshake`] and checks the server's
//! answer against the nonce it sent; the server answers with
//! [`server_accept_response`] or [`BAD_REQUEST`].

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::protocol::http::{RequestHead, ResponseHead};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Status line written to a rejected upgrade before the socket is ended.
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request";

/// Protocol version sent in `Sec-WebSocket-Version`.
pub const WS_VERSION: &str = "13";

const NONCE_LEN: usize = 16;

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use barews::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Generate a fresh base64-encoded 16-byte nonce for `Sec-WebSocket-Key`.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_nonce() -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Client half of the handshake: one nonce, one request, one validation.
///
/// [`ClientHandshake::validate_response`] takes `self` so a nonce can only be checked
/// once; a reconnect builds a new handshake. The type is not `Clone`, so a
/// second validation of the same nonce does not compile:
///
/// ```compile_fail
/// use barews::protocol::ClientHandshake;
///
/// let handshake = ClientHandshake::with_nonce("dGhlIHNhbXBsZSBub25jZQ==", "localhost", "/");
/// let _copy = handshake.clone();
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct ClientHandshake {
    nonce: String,
    host: String,
    path: String,
}

impl ClientHandshake {
    /// Start a handshake for `path` on `host` with a freshly generated nonce.
    ///
    /// `host` is written verbatim into the `Host` header.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if no randomness is available for the nonce.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        Ok(Self::with_nonce(generate_nonce()?, host, path))
    }

    /// Start a handshake with a caller-chosen nonce.
    pub fn with_nonce(
        nonce: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            host: host.into(),
            path: path.into(),
        }
    }

    /// The base64 nonce sent as `Sec-WebSocket-Key`.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// The accept key a well-behaved server must answer with.
    #[must_use]
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.nonce)
    }

    /// Write the HTTP upgrade request to a buffer.
    pub fn write_request(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Version: {}\r\n", WS_VERSION).as_bytes());
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.nonce).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Validate the headers of a `101` upgrade response.
    ///
    /// Checks run in order and the first failure wins:
    /// `Connection` must equal `upgrade`, `Upgrade` must equal `websocket`
    /// (both case-insensitive), and `Sec-WebSocket-Accept` must match the
    /// expected key exactly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] with a reason naming the failed check.
    pub fn validate_response(self, response: &ResponseHead) -> Result<()> {
        let headers = &response.headers;

        if !headers
            .get("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("upgrade"))
        {
            return Err(Error::InvalidHandshake(
                "Expected a `Connection: Upgrade` header from server".into(),
            ));
        }

        if !headers
            .get("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
        {
            return Err(Error::InvalidHandshake(
                "Expected `Upgrade: Websocket` header from server".into(),
            ));
        }

        let expected = self.expected_accept();
        match headers.get("sec-websocket-accept") {
            None | Some("") => Err(Error::InvalidHandshake(
                "Expected `Sec-WebSocket-Accept` header from server".into(),
            )),
            Some(accept) if accept != expected => Err(Error::InvalidHandshake(format!(
                "`Sec-WebSocket-Accept` header value doesn't match with expected value: {}",
                expected
            ))),
            Some(_) => Ok(()),
        }
    }
}

/// Reject any response whose status is not `101`.
///
/// The reason carries the status line and every response header, names
/// lowercased, one `name:value` per line.
///
/// # Errors
///
/// Returns [`Error::HandshakeRejected`] for a non-101 status.
pub fn check_upgrade_status(response: &ResponseHead) -> Result<()> {
    if response.status == 101 {
        return Ok(());
    }

    let headers: Vec<String> = response
        .headers
        .iter()
        .map(|(name, value)| format!("{}:{}", name.to_ascii_lowercase(), value))
        .collect();

    Err(Error::HandshakeRejected(format!(
        "Server responded with non-101 status: {} {}\nResponse Headers Follow:\n{}\n",
        response.status,
        response.reason,
        headers.join("\n")
    )))
}

/// Whether the server should accept this upgrade request.
///
/// Only the `Upgrade` header is inspected; it must equal `websocket`
/// case-insensitively.
#[must_use]
pub fn is_websocket_upgrade(request: &RequestHead) -> bool {
    request
        .headers
        .get("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Build the server's `101` response for an accepted upgrade request.
///
/// A missing `Sec-WebSocket-Key` is treated as an empty key.
#[must_use]
pub fn server_accept_response(request: &RequestHead) -> Vec<u8> {
    let key = request.headers.get("sec-websocket-key").unwrap_or_default();
    let accept = compute_accept_key(key);

    let mut buf = Vec::with_capacity(160);
    buf.extend_from_slice(b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n");
    buf.extend_from_slice(b"Upgrade: Websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", accept).as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf
}
