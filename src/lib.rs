//! # barews - a small RFC 6455 WebSocket client and server
//!
//! `barews` implements the WebSocket upgrade handshake and a compact frame
//! codec on top of tokio, with optional rustls-backed `wss://` support.
//!
//! ## Features
//!
//! - **Client** with an observable connection state machine and typed events
//! - **Server** with a connection registry, plain-HTTP request forwarding and
//!   embedding support for existing HTTP stacks
//! - **Frame codec** covering 7-bit and 16-bit payload lengths and masking
//! - **TLS** through rustls (`tls-rustls` feature, on by default)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use barews::{ClientConfig, ClientEvent, WebSocketClient};
//!
//! # async fn run() -> barews::Result<()> {
//! let (client, mut events) = WebSocketClient::new(ClientConfig::default());
//! client.connect("ws://localhost:9000/")?;
//!
//! if let Some(ClientEvent::Connect) = events.recv().await {
//!     client.send(b"hello");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tls;

pub use client::{ClientEvent, ClientEvents, WebSocketClient};
pub use config::{ClientConfig, Limits, ServerConfig};
pub use connection::{ClientState, SocketState};
pub use error::{Error, ErrorKind, Result};
pub use protocol::{Frame, OpCode, WS_GUID, compute_accept_key};
pub use server::{
    ConnectionId, ServerEvent, ServerEvents, ServerHandle, SocketHandle, WebSocketServer,
};
