//! Game client.
//!
//! Connects over WebSocket, claims a character, then lets the caller send
//! move requests and read replicated events. Every server message passes
//! through a [`ReplicaView`], so [`GameClient::replica`] always shows the
//! newest known state of each visible entity.
//!
//! ```rust,no_run
//! use realmgate::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let mut client = GameClient::connect(
//!     "ws://127.0.0.1:7777",
//!     "token-from-login",
//!     CharacterId(7),
//!     ClientConfig::default(),
//! )
//! .await?;
//!
//! client.request_move(Vec3::new(10.0, 0.0, 4.0)).await?;
//! while let Some(event) = client.next_event().await? {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use realmgate_protocol::{
    CharacterId, ClientMessage, Codec, EntityId, JsonCodec, ProtocolError, ReplicaView,
    ServerMessage, Vec3,
};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client-side waits.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on the WebSocket handshake. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the authentication response.
    /// Default: 10 seconds.
    pub auth_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors that can occur on the client side.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection timed out")]
    ConnectTimeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("no authentication response in time")]
    AuthTimeout,

    /// The server refused the character.
    #[error("authentication rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// An authenticated connection to a Realmgate server.
pub struct GameClient {
    ws: ClientWs,
    codec: JsonCodec,
    entity_id: EntityId,
    replica: ReplicaView,
}

impl GameClient {
    /// Connects to `url` and claims `character_id` with `token`.
    ///
    /// Returns once the server accepted the character. A rejection,
    /// either timeout, or the server closing first is an error.
    pub async fn connect(
        url: &str,
        token: &str,
        character_id: CharacterId,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let (ws, _) = tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(url),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout)?
        .map_err(|e| ClientError::Connect(e.to_string()))?;

        let mut client = Self {
            ws,
            codec: JsonCodec,
            entity_id: EntityId(0),
            replica: ReplicaView::new(),
        };

        client
            .send(&ClientMessage::AuthenticationRequest {
                token: token.to_string(),
                character_id,
            })
            .await?;

        let entity_id = tokio::time::timeout(config.auth_timeout, client.await_acknowledgement())
            .await
            .map_err(|_| ClientError::AuthTimeout)??;
        client.entity_id = entity_id;

        tracing::info!(%entity_id, %character_id, "entered the world");
        Ok(client)
    }

    /// The entity this client controls.
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Asks the server to move this client's entity. The server decides
    /// where it actually goes; watch [`next_event`](Self::next_event).
    pub async fn request_move(&mut self, target_position: Vec3) -> Result<(), ClientError> {
        self.send(&ClientMessage::MoveRequest { target_position }).await
    }

    /// Waits for the next server message and applies it to the replica.
    ///
    /// Returns `Ok(None)` once the server closed the connection.
    pub async fn next_event(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        match self.recv().await {
            Ok(message) => {
                self.replica.apply(&message);
                Ok(Some(message))
            }
            Err(ClientError::Closed) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Entities as last replicated.
    pub fn replica(&self) -> &ReplicaView {
        &self.replica
    }

    /// Closes the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn await_acknowledgement(&mut self) -> Result<EntityId, ClientError> {
        loop {
            let message = self.recv().await?;
            if let ServerMessage::AuthenticationResponse {
                success,
                message,
                entity_id,
            } = &message
            {
                return match (success, entity_id) {
                    (true, Some(id)) => Ok(*id),
                    _ => Err(ClientError::Rejected(message.clone())),
                };
            }
            // Nothing else is sent before the acknowledgement; keep it
            // anyway so the replica is complete.
            self.replica.apply(&message);
        }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let bytes = self.codec.encode(message)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| ClientError::Transport(format!("non-UTF-8 frame: {e}")))?;
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        loop {
            let frame = match self.ws.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
                None => return Err(ClientError::Closed),
            };
            let message = match frame {
                Message::Binary(data) => self.codec.decode(&data)?,
                Message::Text(text) => self.codec.decode(text.as_bytes())?,
                Message::Close(_) => return Err(ClientError::Closed),
                _ => continue,
            };
            return Ok(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.auth_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_client_error_from_protocol_error() {
        let json_err = serde_json::from_str::<ServerMessage>("{").unwrap_err();
        let err: ClientError = ProtocolError::Decode(json_err).into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = GameClient::connect(
            &format!("ws://{addr}"),
            "token",
            CharacterId(1),
            ClientConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Connect(_))));
    }

    #[tokio::test]
    async fn test_connect_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept TCP but never answer the WebSocket upgrade.
        let _held = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let config = ClientConfig {
            connect_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let result = GameClient::connect(&format!("ws://{addr}"), "token", CharacterId(1), config).await;
        assert!(matches!(result, Err(ClientError::ConnectTimeout)));
    }

    #[tokio::test]
    async fn test_connect_unanswered_authentication_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Completes the upgrade, reads the request, never responds.
        let _held = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let config = ClientConfig {
            auth_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let started = std::time::Instant::now();
        let result = GameClient::connect(&format!("ws://{addr}"), "token", CharacterId(1), config).await;

        assert!(matches!(result, Err(ClientError::AuthTimeout)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
