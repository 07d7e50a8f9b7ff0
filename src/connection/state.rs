//! Connection lifecycle states for clients and server-side sockets.

/// Client connection state.
///
/// `Idle → Connecting → AwaitingUpgrade → Validating → Open → Closed`, with
/// `Failed` reachable from any handshake stage. Both `Closed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientState {
    /// Nothing has been attempted yet.
    #[default]
    Idle,
    /// Opening the transport (TCP, then TLS for `wss`).
    Connecting,
    /// Upgrade request sent, waiting for the response head.
    AwaitingUpgrade,
    /// `101` received, checking the upgrade headers.
    Validating,
    /// Handshake complete; frames flow in both directions.
    Open,
    /// The open connection ended.
    Closed,
    /// The handshake never completed.
    Failed,
}

impl ClientState {
    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open` state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ClientState::Open)
    }

    /// Whether no further transition is possible.
    #[must_use]
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ClientState::Closed | ClientState::Failed)
    }

    /// Whether the handshake is in progress.
    #[must_use]
    #[inline]
    pub const fn is_handshaking(&self) -> bool {
        matches!(
            self,
            ClientState::Connecting | ClientState::AwaitingUpgrade | ClientState::Validating
        )
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Idle => write!(f, "Idle"),
            ClientState::Connecting => write!(f, "Connecting"),
            ClientState::AwaitingUpgrade => write!(f, "AwaitingUpgrade"),
            ClientState::Validating => write!(f, "Validating"),
            ClientState::Open => write!(f, "Open"),
            ClientState::Closed => write!(f, "Closed"),
            ClientState::Failed => write!(f, "Failed"),
        }
    }
}

/// State of one accepted server-side socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SocketState {
    /// Upgrade request received, response not yet written.
    #[default]
    Upgrading,
    /// Registered and exchanging frames.
    Open,
    /// Destroyed and gone from the registry.
    Removed,
}

impl SocketState {
    /// Check if sending data is allowed in this state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, SocketState::Open)
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketState::Upgrading => write!(f, "Upgrading"),
            SocketState::Open => write!(f, "Open"),
            SocketState::Removed => write!(f, "Removed"),
        }
    }
}
