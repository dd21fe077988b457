//! Byte-frame transport for Realmgate.
//!
//! The server only sees [`Transport`] and [`Connection`]. An accepted
//! connection is an unauthenticated pipe with a [`ConnectionId`]; which
//! character (if any) sits behind it is decided by the session crate.
//!
//! The `websocket` feature (on by default) provides the
//! `tokio-tungstenite` implementation.

#![allow(async_fn_in_trait)]

mod error;
mod id;
#[cfg(feature = "websocket")]
mod websocket;

use std::net::SocketAddr;

pub use error::TransportError;
pub use id::{ConnectionId, ConnectionIds};
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, PendingUpgrade, WebSocketConnection, WebSocketTransport,
};

/// A listener producing connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Incoming: Incoming<Connection = Self::Connection, Error = Self::Error>;
    type Error: std::error::Error + Send + Sync;

    /// Next accepted socket. Returns before any protocol handshake, so a
    /// slow peer only holds up its own [`Incoming::establish`].
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;
}

/// An accepted socket that has not finished its handshake yet.
pub trait Incoming: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> SocketAddr;

    /// Runs the handshake, bounded by the transport's handshake timeout.
    async fn establish(self) -> Result<Self::Connection, Self::Error>;
}

/// One established connection.
///
/// A reader task and a writer task use the same connection at once, so
/// every method takes `&self` and `send` must not wait behind a pending
/// `recv`.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Next frame, or `Ok(None)` after an orderly close.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> SocketAddr;
}
