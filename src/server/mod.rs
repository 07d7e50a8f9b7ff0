//! WebSocket server.
//!
//! [`WebSocketServer`] owns a TCP listener (optionally TLS-wrapped). Each
//! accepted connection has its HTTP head read; requests with an `Upgrade`
//! header go through the upgrade path, everything else is forwarded to the
//! application as [`ServerEvent::Request`]. Upgraded sockets are tracked in a
//! [`Registry`] and driven by one task each.
//!
//! ```rust,no_run
//! use barews::server::{ServerEvent, WebSocketServer};
//! use barews::ServerConfig;
//!
//! # async fn run() -> barews::Result<()> {
//! let (server, mut events) = WebSocketServer::bind("127.0.0.1:9000", ServerConfig::default()).await?;
//! let handle = server.handle();
//! tokio::spawn(server.run());
//!
//! while let Some(event) = events.recv().await {
//!     if let ServerEvent::Data(socket, payload) = event {
//!         handle.send(&socket, payload);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod registry;
mod request;

pub use registry::{ConnectionId, LogObserver, Registry, RegistryObserver, SocketHandle};
pub use request::{HttpRequest, Io, Responder};

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::connection::{FramedSocket, SocketState};
use crate::error::{Error, Result};
use crate::protocol::handshake::{BAD_REQUEST, is_websocket_upgrade, server_accept_response};
use crate::protocol::http::read_head;
use crate::protocol::{OpCode, RequestHead, encode};
use crate::tls::MaybeTlsStream;

#[cfg(feature = "tls-rustls")]
use crate::tls::{TlsAcceptor, self_signed_server_config, server_config_from_pem};

use registry::Outbound;

/// Disconnect reason for a close frame from the peer.
pub const REASON_CLOSED: &str = "Connection closed";

/// Disconnect reason when the peer ends the stream without a close frame.
pub const REASON_ENDED: &str = "Connection ended";

/// Disconnect reason after [`ServerHandle::destroy`] or [`ServerHandle::shutdown`].
pub const REASON_DESTROYED: &str = "Connection destroyed";

/// Something that happened on the server.
#[derive(Debug)]
pub enum ServerEvent {
    /// A socket completed the upgrade and was registered.
    Connection(SocketHandle),
    /// A frame payload from a socket.
    Data(SocketHandle, Vec<u8>),
    /// A request without an `Upgrade` header.
    Request(HttpRequest, Responder),
    /// A registered socket ended. Emitted once per socket, and it is the
    /// last event naming `id`.
    ///
    /// The event is queued just before the registry entry is removed. A
    /// consumer running on another worker thread may still see
    /// [`ServerHandle::is_connected`] return true for `id`, and a
    /// [`ServerHandle::connection_count`] that includes it, for a short while.
    /// [`SocketHandle::state`] turns to `Removed` once the entry is gone.
    Disconnect { id: ConnectionId, reason: String },
}

/// Receiving half of a server's event stream.
#[derive(Debug)]
pub struct ServerEvents {
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl ServerEvents {
    /// Wait for the next event. Returns `None` once every [`ServerHandle`]
    /// and socket task is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is queued.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }
}

struct Inner {
    id: ConnectionId,
    config: ServerConfig,
    registry: Registry,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl Inner {
    fn emit(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }
}

/// Cloneable handle to a server's registry and socket tasks.
///
/// Also usable on its own: an application with its own HTTP stack can create
/// a handle with [`ServerHandle::new`] and feed it upgrade requests through
/// [`ServerHandle::upgrade`].
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

impl ServerHandle {
    /// Create a handle and its event stream. With `config.verbose`, registry
    /// changes are logged through [`LogObserver`].
    #[must_use]
    pub fn new(config: ServerConfig) -> (Self, ServerEvents) {
        let registry = if config.verbose {
            Registry::with_observer(Arc::new(LogObserver))
        } else {
            Registry::new()
        };
        Self::build(config, registry)
    }

    /// Create a handle whose registry reports to `observer`.
    #[must_use]
    pub fn with_observer(
        config: ServerConfig,
        observer: Arc<dyn RegistryObserver>,
    ) -> (Self, ServerEvents) {
        Self::build(config, Registry::with_observer(observer))
    }

    fn build(config: ServerConfig, registry: Registry) -> (Self, ServerEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let handle = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::generate(),
                config,
                registry,
                events,
            }),
        };
        (handle, ServerEvents { rx })
    }

    /// Identifier of this server, used in log lines.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Send `payload` as one frame to `socket`.
    ///
    /// Silently dropped unless the socket is still registered. Payloads over
    /// 65535 bytes are dropped with a warning.
    pub fn send(&self, socket: &SocketHandle, payload: impl AsRef<[u8]>) {
        self.send_to(socket.id(), payload);
    }

    /// Like [`ServerHandle::send`], addressing the socket by id.
    pub fn send_to(&self, id: &ConnectionId, payload: impl AsRef<[u8]>) {
        let Some(socket) = self.inner.registry.get(id) else {
            return;
        };
        if !socket.state().can_send() || socket.is_closed() {
            return;
        }
        match encode(payload.as_ref()) {
            Ok(frame) => {
                socket.push(Outbound::Write(frame));
            }
            Err(e) => warn!("socket {}: dropping payload: {}", id, e),
        }
    }

    /// End a socket without a close frame. Returns false if `id` is not
    /// registered.
    pub fn destroy(&self, id: &ConnectionId) -> bool {
        self.inner
            .registry
            .get(id)
            .is_some_and(|socket| socket.push(Outbound::Destroy))
    }

    /// Destroy every registered socket. Each one ends with a
    /// [`REASON_DESTROYED`] disconnect. Returns how many sockets were
    /// signalled.
    ///
    /// The listener is not affected; stop [`WebSocketServer::run`] separately.
    pub fn shutdown(&self) -> usize {
        let ids = self.inner.registry.ids();
        let destroyed = ids.iter().filter(|id| self.destroy(id)).count();
        debug!("server {}: shutting down {} sockets", self.inner.id, destroyed);
        destroyed
    }

    /// Number of registered sockets.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Registered socket ids, sorted.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.registry.ids()
    }

    #[must_use]
    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Complete the server side of an upgrade on a stream whose request head
    /// was already read. `leftover` holds any bytes read past the head.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidHandshake` if the `Upgrade` header is not
    ///   `websocket`; the stream has been answered with `400 Bad Request`
    ///   and shut down
    /// - `Error::Io` if writing the response fails
    pub async fn upgrade<S>(
        &self,
        stream: S,
        request: RequestHead,
        leftover: &[u8],
    ) -> Result<SocketHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.accept_upgrade(stream, request, leftover, None).await
    }

    async fn accept_upgrade<S>(
        &self,
        mut stream: S,
        request: RequestHead,
        leftover: &[u8],
        peer: Option<SocketAddr>,
    ) -> Result<SocketHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if !is_websocket_upgrade(&request) {
            let offered = request.headers.get("upgrade").unwrap_or_default();
            warn!(
                "server {}: rejecting upgrade to {} (Upgrade: {:?})",
                self.inner.id, request.target, offered
            );
            reject(&mut stream).await;
            return Err(Error::InvalidHandshake(format!(
                "Unsupported upgrade protocol `{}`",
                offered
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(ConnectionId::generate(), peer, tx);

        stream.write_all(&server_accept_response(&request)).await?;
        stream.flush().await?;

        let config = &self.inner.config;
        let socket = FramedSocket::new(stream, config.limits.clone(), config.read_buffer_size)
            .with_buffered(leftover);

        handle.set_state(SocketState::Open);
        self.inner.registry.insert(handle.clone());
        info!(
            "server {}: socket {} upgraded on {}",
            self.inner.id,
            handle.id(),
            request.target
        );
        self.inner.emit(ServerEvent::Connection(handle.clone()));

        tokio::spawn(pump(Arc::clone(&self.inner), handle.clone(), socket, rx));
        Ok(handle)
    }

    /// Read one request head from a fresh connection and route it.
    async fn dispatch<S>(&self, mut io: S, peer: Option<SocketAddr>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = &self.inner.config;
        let mut buf = BytesMut::with_capacity(config.read_buffer_size);

        let parsed = match read_head(&mut io, &mut buf, &config.limits).await {
            Ok(head) => RequestHead::parse(&head),
            Err(Error::ConnectionClosed) => return Ok(()),
            Err(e @ Error::Io(_)) => return Err(e),
            Err(e) => Err(e),
        };

        let request = match parsed {
            Ok(request) => request,
            Err(e) => {
                reject(&mut io).await;
                return Err(e);
            }
        };

        if request.is_upgrade() {
            self.accept_upgrade(io, request, &buf, peer).await?;
        } else {
            debug!(
                "server {}: forwarding {} {}",
                self.inner.id, request.method, request.target
            );
            self.inner.emit(ServerEvent::Request(
                HttpRequest::new(request, peer),
                Responder::new(Box::new(io), buf),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("id", &self.inner.id)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

async fn reject<S: AsyncWrite + Unpin>(stream: &mut S) {
    let _ = stream.write_all(BAD_REQUEST).await;
    let _ = stream.shutdown().await;
}

async fn pump<T>(
    inner: Arc<Inner>,
    handle: SocketHandle,
    mut socket: FramedSocket<T>,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let id = handle.id().clone();

    let reason = loop {
        tokio::select! {
            frame = socket.read_frame() => match frame {
                Ok(Some(frame)) if frame.opcode == OpCode::Close => {
                    debug!("socket {}: close frame", id);
                    break REASON_CLOSED.to_string();
                }
                Ok(Some(frame)) => {
                    debug!("socket {}: {} byte frame", id, frame.payload_length);
                    inner.emit(ServerEvent::Data(handle.clone(), frame.into_payload()));
                }
                Ok(None) => break REASON_ENDED.to_string(),
                Err(e @ Error::Io(_)) => break format!("Connection error: {}", e),
                Err(e) => break format!("Protocol error: {}", e),
            },
            command = commands.recv() => match command {
                Some(Outbound::Write(bytes)) => {
                    if let Err(e) = socket.send(&bytes).await {
                        break format!("Connection error: {}", e);
                    }
                }
                Some(Outbound::Destroy) | None => break REASON_DESTROYED.to_string(),
            },
        }
    };

    debug!("socket {}: ending ({})", id, reason);
    inner.emit(ServerEvent::Disconnect {
        id: id.clone(),
        reason: reason.clone(),
    });
    inner.registry.remove(&id, &reason);
    handle.set_state(SocketState::Removed);
    drop(commands);

    let _ = socket.shutdown().await;
}

#[derive(Clone, Default)]
struct Transport {
    #[cfg(feature = "tls-rustls")]
    acceptor: Option<TlsAcceptor>,
}

impl Transport {
    #[cfg(feature = "tls-rustls")]
    fn from_config(config: &ServerConfig) -> Result<Self> {
        if !config.secure {
            return Ok(Self::default());
        }

        let tls = match (&config.cert, &config.key) {
            (Some(cert), Some(key)) => server_config_from_pem(cert, key)?,
            _ => {
                warn!("no certificate configured, using a throwaway self-signed one; do not use in production");
                self_signed_server_config()?
            }
        };
        Ok(Self {
            acceptor: Some(TlsAcceptor::new(tls)),
        })
    }

    #[cfg(not(feature = "tls-rustls"))]
    fn from_config(config: &ServerConfig) -> Result<Self> {
        if config.secure {
            return Err(Error::Tls(
                "secure server needs the `tls-rustls` feature".into(),
            ));
        }
        Ok(Self::default())
    }

    fn is_secure(&self) -> bool {
        #[cfg(feature = "tls-rustls")]
        {
            self.acceptor.is_some()
        }
        #[cfg(not(feature = "tls-rustls"))]
        {
            false
        }
    }

    async fn wrap(&self, stream: TcpStream) -> Result<MaybeTlsStream<TcpStream>> {
        #[cfg(feature = "tls-rustls")]
        {
            if let Some(acceptor) = &self.acceptor {
                return Ok(acceptor.accept(stream).await?);
            }
        }
        Ok(MaybeTlsStream::Plain(stream))
    }
}

/// A listening WebSocket server.
pub struct WebSocketServer {
    handle: ServerHandle,
    listener: TcpListener,
    transport: Transport,
}

impl WebSocketServer {
    /// Bind a listener at `addr`.
    ///
    /// With `config.secure`, connections are TLS-wrapped using the configured
    /// PEM certificate and key, or a generated self-signed certificate when
    /// none is set.
    ///
    /// # Errors
    ///
    /// - `Error::Io` if binding fails
    /// - `Error::Tls` if the certificate material is unusable, or `secure`
    ///   is set without the `tls-rustls` feature
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        config: ServerConfig,
    ) -> Result<(Self, ServerEvents)> {
        let transport = Transport::from_config(&config)?;
        let listener = TcpListener::bind(addr).await?;
        let (handle, events) = ServerHandle::new(config);

        let server = Self {
            handle,
            listener,
            transport,
        };
        info!(
            "server {}: listening on {:?} (tls: {})",
            server.handle.id(),
            server.local_addr().ok(),
            server.transport.is_secure()
        );
        Ok((server, events))
    }

    /// Wrap an existing listener. `secure`, `cert` and `key` are ignored.
    #[must_use]
    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> (Self, ServerEvents) {
        let (handle, events) = ServerHandle::new(config);
        (Self::with_handle(listener, handle), events)
    }

    /// Serve `listener` through an existing handle.
    #[must_use]
    pub fn with_handle(listener: TcpListener, handle: ServerHandle) -> Self {
        Self {
            handle,
            listener,
            transport: Transport::default(),
        }
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accept connections until the returned future is dropped.
    ///
    /// Accept failures are logged and do not stop the loop.
    pub async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("server {}: accept failed: {}", self.handle.id(), e);
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);
            debug!("server {}: accepted {}", self.handle.id(), peer);

            let handle = self.handle.clone();
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let io = match transport.wrap(stream).await {
                    Ok(io) => io,
                    Err(e) => {
                        warn!("server {}: TLS accept from {} failed: {}", handle.id(), peer, e);
                        return;
                    }
                };
                if let Err(e) = handle.dispatch(io, Some(peer)).await {
                    debug!("server {}: connection from {} dropped: {}", handle.id(), peer, e);
                }
            });
        }
    }
}

impl std::fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("handle", &self.handle)
            .field("local_addr", &self.listener.local_addr().ok())
            .field("tls", &self.transport.is_secure())
            .finish()
    }
}
