//! `RealmgateServer` builder and accept loop.
//!
//! This is the entry point for running a Realmgate server. It ties the
//! layers together: transport → protocol → authority loop (session gate +
//! movement authority).

use std::sync::Arc;

use realmgate_identity::IdentityVerifier;
use realmgate_protocol::JsonCodec;
use realmgate_transport::{Transport, WebSocketTransport};
use realmgate_world::{FlatGround, NavigableSurface};
use tokio::sync::mpsc;

use crate::authority::{AuthorityLoop, EVENT_QUEUE_CAPACITY};
use crate::handler::handle_connection;
use crate::{RealmgateError, ServerConfig};

/// Builder for configuring and starting a Realmgate server.
///
/// # Example
///
/// ```rust,ignore
/// use realmgate::prelude::*;
///
/// let server = RealmgateServerBuilder::new()
///     .bind("0.0.0.0:7777")
///     .build(HttpIdentityClient::new(IdentityConfig::default())?)
///     .await?;
/// server.run().await
/// ```
pub struct RealmgateServerBuilder {
    config: ServerConfig,
    surface: Option<Box<dyn NavigableSurface>>,
}

impl RealmgateServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            surface: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the walkable surface. Without one, the server uses flat
    /// ground of `world_half_extent` around the origin.
    pub fn surface(mut self, surface: impl NavigableSurface) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    /// Binds the listener. Nothing is accepted until
    /// [`run`](RealmgateServer::run).
    pub async fn build<V: IdentityVerifier>(
        self,
        verifier: V,
    ) -> Result<RealmgateServer<V>, RealmgateError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let surface = self.surface.unwrap_or_else(|| {
            Box::new(FlatGround::centered(self.config.world_half_extent, 0.0))
        });

        Ok(RealmgateServer {
            transport,
            config: self.config,
            surface,
            verifier: Arc::new(verifier),
        })
    }
}

impl Default for RealmgateServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Realmgate server.
///
/// Call [`run()`](Self::run) to start the authority loop and accept
/// connections.
pub struct RealmgateServer<V: IdentityVerifier> {
    transport: WebSocketTransport,
    config: ServerConfig,
    surface: Box<dyn NavigableSurface>,
    verifier: Arc<V>,
}

impl<V: IdentityVerifier> RealmgateServer<V> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the authority loop and runs the accept loop.
    ///
    /// Runs until the future is dropped; accept failures are logged and
    /// the loop keeps going.
    pub async fn run(mut self) -> Result<(), RealmgateError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let authority = AuthorityLoop::new(&self.config, self.surface, self.verifier, events_rx);
        let authority = tokio::spawn(authority.run());
        // Dropping `run` stops the simulation with it.
        let _authority = AbortOnDrop(authority);

        tracing::info!(addr = %self.config.bind_addr, "Realmgate server running");

        loop {
            match self.transport.accept().await {
                // The upgrade runs in the connection's own task.
                Ok(incoming) => {
                    let events = events_tx.clone();
                    tokio::spawn(handle_connection(incoming, JsonCodec, events));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
