//! Integration tests for the Realmgate server over real WebSocket
//! connections.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use realmgate::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Scripted verifier
// =========================================================================

/// Accepts `"token-<id>"` for character `<id>`; everything else is
/// rejected. Character 42 has a saved position, all others start at the
/// origin.
struct ScriptedVerifier;

impl IdentityVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        token: &str,
        character_id: CharacterId,
    ) -> Result<CharacterRecord, VerificationError> {
        if token != format!("token-{}", character_id.0) {
            return Err(VerificationError::TokenRejected("unknown token".into()));
        }
        let position = if character_id.0 == 42 {
            Vec3::new(-3.0, 0.0, 2.0)
        } else {
            Vec3::ZERO
        };
        Ok(CharacterRecord {
            id: character_id,
            owner: None,
            name: format!("hero-{}", character_id.0),
            race: "Human".into(),
            character_class: "Warrior".into(),
            position,
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const GRACE: Duration = Duration::from_millis(300);

/// Starts a server on a random port and returns its WebSocket URL.
async fn start_server() -> String {
    let mut config = ServerConfig::default();
    config.session.rejection_grace = GRACE;
    config.session.admission_timeout = Duration::from_secs(2);

    let server = RealmgateServerBuilder::new()
        .config(config)
        .bind("127.0.0.1:0")
        .surface(FlatGround::centered(50.0, 0.0))
        .build(ScriptedVerifier)
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr");

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    format!("ws://{addr}")
}

async fn join(url: &str, character: i64) -> GameClient {
    GameClient::connect(
        url,
        &format!("token-{character}"),
        CharacterId(character),
        ClientConfig::default(),
    )
    .await
    .expect("should be accepted")
}

async fn raw_connect(url: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("should connect");
    ws
}

async fn raw_send(ws: &mut ClientWs, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

/// Next decoded server message, or `None` once the server closed.
async fn raw_recv(ws: &mut ClientWs) -> Option<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within 5s");
        match frame {
            Some(Ok(Message::Binary(data))) => return Some(serde_json::from_slice(&data).unwrap()),
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Reads events until `pred` matches, failing after 5 seconds.
async fn wait_for<F>(client: &mut GameClient, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = client
                .next_event()
                .await
                .expect("event")
                .expect("connection open");
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("expected event within 5s")
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_connect_valid_token_is_accepted_and_sees_itself() {
    let url = start_server().await;
    let mut client = join(&url, 7).await;
    let own = client.entity_id();

    let spawned = wait_for(&mut client, |m| {
        matches!(m, ServerMessage::EntitySpawned(s) if s.entity_id == own)
    })
    .await;

    let ServerMessage::EntitySpawned(snapshot) = spawned else {
        unreachable!()
    };
    assert_eq!(snapshot.character_id, CharacterId(7));
    assert_eq!(snapshot.name, "hero-7");
    assert_eq!(snapshot.position, realmgate::DEFAULT_SPAWN_POINT);
    assert_eq!(snapshot.state, MovementState::Idle);
    assert!(client.replica().get(own).is_some());
}

#[tokio::test]
async fn test_connect_saved_position_is_used() {
    let url = start_server().await;
    let mut client = join(&url, 42).await;
    let own = client.entity_id();

    wait_for(&mut client, |m| {
        matches!(m, ServerMessage::EntitySpawned(s) if s.entity_id == own)
    })
    .await;
    assert_eq!(
        client.replica().get(own).unwrap().position(),
        Vec3::new(-3.0, 0.0, 2.0)
    );
}

#[tokio::test]
async fn test_connect_bad_token_is_rejected_by_client() {
    let url = start_server().await;
    let result = GameClient::connect(
        &url,
        "stolen",
        CharacterId(7),
        ClientConfig::default(),
    )
    .await;

    match result {
        Err(ClientError::Rejected(reason)) => assert_eq!(reason, "invalid token or character"),
        Err(e) => panic!("expected rejection, got {e}"),
        Ok(_) => panic!("expected rejection, got acceptance"),
    }
}

#[tokio::test]
async fn test_rejection_one_response_then_close_after_grace() {
    let url = start_server().await;
    let mut ws = raw_connect(&url).await;

    raw_send(
        &mut ws,
        &ClientMessage::AuthenticationRequest {
            token: "stolen".into(),
            character_id: CharacterId(7),
        },
    )
    .await;

    let first = raw_recv(&mut ws).await.expect("rejection");
    let rejected_at = Instant::now();
    assert!(matches!(
        first,
        ServerMessage::AuthenticationResponse { success: false, entity_id: None, .. }
    ));

    // Nothing but the close follows.
    assert!(raw_recv(&mut ws).await.is_none());
    let waited = rejected_at.elapsed();
    // The grace starts after the write, so allow scheduling slack.
    assert!(
        waited >= GRACE - Duration::from_millis(50),
        "closed after only {waited:?}"
    );
}

#[tokio::test]
async fn test_silent_connection_is_closed_after_admission_timeout() {
    let url = start_server().await;
    let mut ws = raw_connect(&url).await;
    let started = Instant::now();

    assert!(raw_recv(&mut ws).await.is_none());
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(1900), "closed after only {waited:?}");
}

#[tokio::test]
async fn test_peer_ignoring_close_is_still_disconnected() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let url = start_server().await;
    let addr = url.trim_start_matches("ws://").to_string();
    let mut socket = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let upgrade = format!(
        "GET / HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n"
    );
    socket.write_all(upgrade.as_bytes()).await.unwrap();
    let started = Instant::now();

    // Read the upgrade response and the close frame, never answer either.
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    let ended = tokio::time::timeout(Duration::from_secs(8), async {
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await;

    assert!(ended.is_ok(), "server kept the socket open");
    assert!(started.elapsed() >= Duration::from_millis(1900));
    assert!(received.starts_with(b"HTTP/1.1 101"));
    assert!(received.windows(2).any(|w| w == [0x88, 0x00]), "no close frame sent");
}

#[tokio::test]
async fn test_idle_socket_does_not_delay_other_players() {
    let url = start_server().await;
    let addr = url.trim_start_matches("ws://").to_string();
    let _idle = tokio::net::TcpStream::connect(&addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let _client = join(&url, 7).await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "join took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let url = start_server().await;
    let mut ws = raw_connect(&url).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    raw_send(
        &mut ws,
        &ClientMessage::AuthenticationRequest {
            token: "token-7".into(),
            character_id: CharacterId(7),
        },
    )
    .await;

    let reply = raw_recv(&mut ws).await.expect("response");
    assert!(matches!(
        reply,
        ServerMessage::AuthenticationResponse { success: true, entity_id: Some(_), .. }
    ));
}

// =========================================================================
// Movement and replication
// =========================================================================

#[tokio::test]
async fn test_move_request_is_replicated_to_both_players() {
    let url = start_server().await;
    let mut mover = join(&url, 7).await;
    let mut watcher = join(&url, 8).await;
    let mover_entity = mover.entity_id();

    // Watcher knows about the mover through the bind snapshot.
    wait_for(&mut watcher, |m| {
        matches!(m, ServerMessage::EntitySpawned(s) if s.entity_id == mover_entity)
    })
    .await;

    let target = Vec3::new(7.0, 0.0, 5.0);
    mover.request_move(target).await.unwrap();

    for client in [&mut mover, &mut watcher] {
        let mut saw_moving = false;
        wait_for(client, |m| match m {
            ServerMessage::StateUpdate(u) if u.entity_id == mover_entity => {
                saw_moving |= u.state == MovementState::Moving;
                saw_moving && u.state == MovementState::Idle
            }
            _ => false,
        })
        .await;

        let replica = client.replica().get(mover_entity).unwrap();
        assert_eq!(replica.state(), MovementState::Idle);
        assert!(replica.position().distance(target) <= 0.5);
    }
}

#[tokio::test]
async fn test_unreachable_destination_is_ignored() {
    let url = start_server().await;
    let mut client = join(&url, 7).await;
    let own = client.entity_id();
    wait_for(&mut client, |m| {
        matches!(m, ServerMessage::EntitySpawned(s) if s.entity_id == own)
    })
    .await;

    client.request_move(Vec3::new(500.0, 0.0, 0.0)).await.unwrap();

    let quiet = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            match client.next_event().await {
                Ok(Some(ServerMessage::StateUpdate(u)))
                    if u.entity_id == own && u.state == MovementState::Moving =>
                {
                    return;
                }
                Ok(Some(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(quiet.is_err(), "entity started moving toward an unreachable point");
    assert_eq!(client.replica().get(own).unwrap().state(), MovementState::Idle);
}

#[tokio::test]
async fn test_disconnect_despawns_for_remaining_players() {
    let url = start_server().await;
    let leaver = join(&url, 7).await;
    let leaver_entity = leaver.entity_id();
    let mut stayer = join(&url, 8).await;

    wait_for(&mut stayer, |m| {
        matches!(m, ServerMessage::EntitySpawned(s) if s.entity_id == leaver_entity)
    })
    .await;

    leaver.close().await.unwrap();

    wait_for(&mut stayer, |m| {
        matches!(m, ServerMessage::EntityDespawned { entity_id } if *entity_id == leaver_entity)
    })
    .await;
    assert!(stayer.replica().get(leaver_entity).is_none());
}
