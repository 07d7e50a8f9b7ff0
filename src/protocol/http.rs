//! Minimal HTTP/1.1 head handling for the upgrade exchange.
//!
//! Only the request/status line and the header block are parsed; bodies are
//! left on the stream for whoever handles the request.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::Limits;
use crate::error::{Error, Result};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping the name as given.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header named `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over `(name, value)` pairs in received order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse header lines up to the first empty line.
fn parse_headers<'a, I>(lines: I) -> Result<Headers>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = Headers::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHandshake(format!("Malformed header line: {}", line)))?;
        headers.push(name.trim(), value.trim());
    }

    Ok(headers)
}

fn head_text(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))
}

/// Parsed HTTP request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target as sent, e.g. `/chat?room=1`.
    pub target: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Request headers.
    pub headers: Headers,
}

impl RequestHead {
    /// Parse a request head from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the data is not UTF-8, the
    /// request line does not have three parts, or a header line has no colon.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = head_text(data)?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, target, version] = parts.as_slice() else {
            return Err(Error::InvalidHandshake(format!(
                "Invalid request line: {}",
                request_line
            )));
        };

        Ok(Self {
            method: (*method).to_string(),
            target: (*target).to_string(),
            version: (*version).to_string(),
            headers: parse_headers(lines)?,
        })
    }

    /// Path component of the target, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Whether the request asks for a protocol upgrade.
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        self.headers.contains("upgrade")
    }
}

/// Parsed HTTP response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Status code.
    pub status: u16,
    /// Reason phrase, possibly empty.
    pub reason: String,
    /// Response headers.
    pub headers: Headers,
}

impl ResponseHead {
    /// Parse a response head from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the data is not UTF-8, the
    /// status line is missing or its code is not numeric.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = head_text(data)?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                Error::InvalidHandshake(format!("Invalid status line: {}", status_line))
            })?;
        let reason = parts.next().unwrap_or_default();

        Ok(Self {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers: parse_headers(lines)?,
        })
    }
}

/// Offset just past the blank line ending an HTTP head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Read from `io` until `buf` holds a complete HTTP head, then split it off.
///
/// Bytes that arrived after the head stay in `buf`.
///
/// # Errors
///
/// - `Error::HandshakeTooLarge` if no head terminator shows up within
///   `limits.max_handshake_size` bytes
/// - `Error::ConnectionClosed` if the peer closes first
/// - `Error::Io` on read failure
pub async fn read_head<R>(io: &mut R, buf: &mut BytesMut, limits: &Limits) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = find_head_end(buf) {
            limits.check_handshake_size(end)?;
            return Ok(buf.split_to(end));
        }

        limits.check_handshake_size(buf.len())?;

        buf.reserve(1024);
        if io.read_buf(buf).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
    }
}
