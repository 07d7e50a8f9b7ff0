//! WebSocket client.
//!
//! A [`WebSocketClient`] drives one connection attempt. `connect` validates
//! the URL synchronously, then a background task performs the transport
//! connect, the upgrade exchange and the frame loop. Everything the task
//! observes is reported on the paired [`ClientEvents`] stream.
//!
//! ```rust,no_run
//! use barews::client::{ClientEvent, WebSocketClient};
//! use barews::ClientConfig;
//!
//! # async fn run() -> barews::Result<()> {
//! let (client, mut events) = WebSocketClient::new(ClientConfig::default());
//! client.connect("ws://localhost:9000/")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ClientEvent::Connect => client.send(b"hello"),
//!         ClientEvent::Data(payload) => println!("{}", String::from_utf8_lossy(&payload)),
//!         ClientEvent::ConnectFail(err) => return Err(err),
//!         ClientEvent::Disconnect(_) => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod target;

pub use target::Target;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::config::ClientConfig;
use crate::connection::{ClientState, FramedSocket};
use crate::error::{Error, Result};
use crate::protocol::handshake::check_upgrade_status;
use crate::protocol::http::read_head;
use crate::protocol::{ClientHandshake, OpCode, ResponseHead, close_frame, encode};
use crate::tls::MaybeTlsStream;

#[cfg(feature = "tls-rustls")]
use crate::tls::TlsConnector;

/// Disconnect reason for a peer close frame or end of stream.
pub const REASON_CLOSED: &str = "Connection closed";

/// Disconnect reason after [`WebSocketClient::close`].
pub const REASON_CLOSED_BY_CLIENT: &str = "Connection closed by client";

/// Something that happened on a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The upgrade succeeded; `send` now writes frames.
    Connect,
    /// The connection never opened.
    ConnectFail(Error),
    /// An open connection ended, with a human-readable reason.
    Disconnect(String),
    /// A frame payload from the server.
    Data(Vec<u8>),
}

/// Receiving half of a client's event stream.
#[derive(Debug)]
pub struct ClientEvents {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl ClientEvents {
    /// Wait for the next event. Returns `None` once the client and its
    /// connection task are gone.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is queued.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

enum Command {
    Write(Vec<u8>),
    Close,
}

struct Shared {
    id: String,
    state: watch::Sender<ClientState>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Shared {
    fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ClientState) {
        let previous = self.state.send_replace(state);
        debug!("client {}: {} -> {}", self.id, previous, state);
    }

    fn emit(&self, event: ClientEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// A single-use WebSocket client connection.
///
/// Once the connection reaches [`ClientState::Closed`] or
/// [`ClientState::Failed`] the client cannot be reused; build a new one to
/// reconnect. Dropping the client closes an open connection.
pub struct WebSocketClient {
    shared: Arc<Shared>,
    config: ClientConfig,
    commands: mpsc::UnboundedSender<Command>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

impl WebSocketClient {
    /// Create an idle client and the stream its events arrive on.
    #[must_use]
    pub fn new(config: ClientConfig) -> (Self, ClientEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands, pending) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ClientState::Idle);

        let client = Self {
            shared: Arc::new(Shared {
                id: uuid::Uuid::new_v4().to_string(),
                state,
                events: events_tx,
            }),
            config,
            commands,
            pending: Mutex::new(Some(pending)),
        };

        (client, ClientEvents { rx: events_rx })
    }

    /// Opaque identifier of this client, used in log lines.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// Connect to a `ws://` or `wss://` URL.
    ///
    /// Returns as soon as the URL is validated; the outcome arrives as
    /// [`ClientEvent::Connect`] or [`ClientEvent::ConnectFail`].
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` if the URL lacks a ws/wss scheme or a host
    /// - `Error::InvalidState` if the client was already used, or no tokio
    ///   runtime is running
    pub fn connect(&self, url: &str) -> Result<()> {
        let target = Target::parse(url)?;
        let addr = (target.host.clone(), target.port);
        self.start(target, async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok::<_, Error>(stream)
        })
    }

    /// Run the handshake over an already-connected transport.
    ///
    /// `url` still decides the request path, the `Host` header and whether
    /// TLS is layered on top of `stream`.
    ///
    /// # Errors
    ///
    /// Same as [`WebSocketClient::connect`].
    pub fn connect_with_stream<S>(&self, url: &str, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let target = Target::parse(url)?;
        self.start(target, async move { Ok::<_, Error>(stream) })
    }

    fn start<S, F>(&self, target: Target, transport: F) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = Result<S>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::InvalidState("connect requires a running tokio runtime".into()))?;

        let commands = {
            let mut pending = self.pending.lock();
            if self.shared.state() != ClientState::Idle {
                return Err(Error::InvalidState(format!(
                    "client is {}, connect needs a fresh client",
                    self.shared.state()
                )));
            }
            pending
                .take()
                .ok_or_else(|| Error::InvalidState("client already connected".into()))?
        };

        info!("client {}: connecting to {}", self.shared.id, target);
        self.shared.set_state(ClientState::Connecting);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        runtime.spawn(run(shared, config, target, transport, commands));
        Ok(())
    }

    /// Send `payload` as one frame.
    ///
    /// Silently dropped unless the connection is open. Payloads over 65535
    /// bytes cannot be framed and are dropped with a warning.
    pub fn send(&self, payload: impl AsRef<[u8]>) {
        if !self.shared.state().can_send() {
            return;
        }
        match encode(payload.as_ref()) {
            Ok(frame) => {
                let _ = self.commands.send(Command::Write(frame));
            }
            Err(e) => warn!("client {}: dropping payload: {}", self.shared.id, e),
        }
    }

    /// Send a close frame and end the connection. No-op unless open.
    pub fn close(&self) {
        if self.shared.state().can_send() {
            let _ = self.commands.send(Command::Close);
        }
    }
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .finish()
    }
}

async fn run<S, F>(
    shared: Arc<Shared>,
    config: ClientConfig,
    target: Target,
    transport: F,
    commands: mpsc::UnboundedReceiver<Command>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = Result<S>> + Send + 'static,
{
    let opening = async {
        let io = transport.await?;
        upgrade(&shared, &config, &target, io).await
    };

    match with_timeout(config.handshake_timeout, opening).await {
        Ok(socket) => {
            shared.set_state(ClientState::Open);
            shared.emit(ClientEvent::Connect);
            pump(&shared, socket, commands).await;
        }
        Err(e) => {
            warn!("client {}: connect to {} failed: {}", shared.id, target, e);
            shared.set_state(ClientState::Failed);
            shared.emit(ClientEvent::ConnectFail(e));
        }
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::HandshakeTimeout)?,
        None => fut.await,
    }
}

async fn open_transport<S>(
    config: &ClientConfig,
    target: &Target,
    io: S,
) -> Result<MaybeTlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !target.secure {
        return Ok(MaybeTlsStream::Plain(io));
    }

    #[cfg(feature = "tls-rustls")]
    {
        if !config.tls.verifies_certificates() {
            warn!("TLS certificate verification is disabled for {}", target);
        }
        let connector = TlsConnector::new(config.tls.client_config()?);
        Ok(connector.connect(&target.host, io).await?)
    }

    #[cfg(not(feature = "tls-rustls"))]
    {
        let _ = (config, io);
        Err(Error::Tls(
            "wss:// needs the `tls-rustls` feature".into(),
        ))
    }
}

async fn upgrade<S>(
    shared: &Shared,
    config: &ClientConfig,
    target: &Target,
    io: S,
) -> Result<FramedSocket<MaybeTlsStream<S>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = open_transport(config, target, io).await?;

    let handshake = ClientHandshake::new(target.host_header(), target.path.clone())?;
    let mut request = Vec::with_capacity(256);
    handshake.write_request(&mut request);
    stream.write_all(&request).await?;
    stream.flush().await?;
    shared.set_state(ClientState::AwaitingUpgrade);

    let mut buf = BytesMut::with_capacity(config.read_buffer_size);
    let head = read_head(&mut stream, &mut buf, &config.limits).await?;
    let response = ResponseHead::parse(&head)?;
    check_upgrade_status(&response)?;

    shared.set_state(ClientState::Validating);
    if let Err(e) = handshake.validate_response(&response) {
        let _ = stream.shutdown().await;
        return Err(e);
    }

    Ok(FramedSocket::new(stream, config.limits.clone(), config.read_buffer_size)
        .with_buffered(&buf))
}

async fn pump<T>(
    shared: &Shared,
    mut socket: FramedSocket<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        tokio::select! {
            frame = socket.read_frame() => match frame {
                Ok(Some(frame)) if frame.opcode == OpCode::Close => {
                    debug!("client {}: close frame from server", shared.id);
                    break REASON_CLOSED.to_string();
                }
                Ok(Some(frame)) => shared.emit(ClientEvent::Data(frame.into_payload())),
                Ok(None) => break REASON_CLOSED.to_string(),
                Err(e @ Error::Io(_)) => break format!("Connection error: {}", e),
                Err(e) => break format!("Protocol error: {}", e),
            },
            command = commands.recv() => match command {
                Some(Command::Write(bytes)) => {
                    if let Err(e) = socket.send(&bytes).await {
                        break format!("Connection error: {}", e);
                    }
                }
                Some(Command::Close) | None => {
                    let _ = socket.send(&close_frame()).await;
                    break REASON_CLOSED_BY_CLIENT.to_string();
                }
            },
        }
    };

    let _ = socket.shutdown().await;
    drop(socket);

    info!("client {}: disconnected ({})", shared.id, reason);
    shared.set_state(ClientState::Closed);
    shared.emit(ClientEvent::Disconnect(reason));
}
