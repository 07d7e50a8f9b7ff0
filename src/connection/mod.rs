//! Per-socket plumbing shared by the client and the server.
//!
//! After the upgrade both sides run the same loop: a [`FramedSocket`] turns
//! the byte stream into frames, and the owner tracks where the socket is in
//! its lifecycle with [`ClientState`] or [`SocketState`].

mod framed;
mod state;

pub use framed::FramedSocket;
pub use state::{ClientState, SocketState};
