//! Connection target parsed from a `ws://` or `wss://` URL.

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// Where a client connects and what it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// `true` for `wss://`.
    pub secure: bool,
    /// Hostname or IP literal, without IPv6 brackets.
    pub host: String,
    /// Explicit port, or 80/443 from the scheme.
    pub port: u16,
    /// Path plus query string, as sent on the request line.
    pub path: String,
}

impl Target {
    /// Parse and normalize a WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the URL does not parse, has a scheme
    /// other than `ws`/`wss`, or has no host.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| match e {
            url::ParseError::RelativeUrlWithoutBase => Error::InvalidUrl(
                "Must specify a valid WebSocket URL that includes the protocol".into(),
            ),
            url::ParseError::EmptyHost => Error::InvalidUrl(
                "Must specify a full WebSocket URL that includes hostname".into(),
            ),
            other => other.into(),
        })?;

        let secure = match parsed.scheme() {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(Error::InvalidUrl(format!(
                    "Unsupported scheme `{}`, expected ws or wss",
                    other
                )))
            }
        };

        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                return Err(Error::InvalidUrl(
                    "Must specify a full WebSocket URL that includes hostname".into(),
                ))
            }
        };

        let port = parsed
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };

        Ok(Self {
            secure,
            host,
            port,
            path,
        })
    }

    /// Port implied by the scheme.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        if self.secure {
            443
        } else {
            80
        }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Value for the `Host` header; the port is omitted when it is the default.
    #[must_use]
    pub fn host_header(&self) -> String {
        if self.port == self.default_port() {
            self.bracketed_host()
        } else {
            format!("{}:{}", self.bracketed_host(), self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{}://{}:{}{}", scheme, self.bracketed_host(), self.port, self.path)
    }
}
