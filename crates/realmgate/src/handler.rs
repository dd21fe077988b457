//! Per-connection I/O.
//!
//! Each accepted socket gets a reader (this task) and a writer task.
//! Neither holds any game state:
//!   1. Finish the WebSocket upgrade, bounded by the handshake timeout
//!   2. Register with the loop, handing it the bounded outbound queue
//!   3. Writer: encode and send queued messages in order; on `Close`,
//!      wait out the delay, send the close frame and stop
//!   4. Reader: decode frames and forward them to the loop until the
//!      transport closes or the writer stops
//!   5. The guard reports the disconnect, however the reader exits
//!
//! The socket is released once both tasks are gone, so a server-side
//! close never depends on the peer answering it.

use std::sync::Arc;
use std::time::Duration;

use realmgate_protocol::{ClientMessage, Codec};
use realmgate_transport::{Connection, ConnectionId, Incoming, PendingUpgrade, WebSocketConnection};
use tokio::sync::mpsc;

use crate::authority::{LoopEvent, OUTBOUND_QUEUE_CAPACITY, Outbound, OutboundQueue};

/// Upper bound on sending the close frame to a peer that stopped reading.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Drop guard that tells the loop a connection is gone.
///
/// `Drop` is synchronous and the event queue is bounded, so the send is
/// spawned as a fire-and-forget task.
struct DisconnectGuard {
    connection_id: ConnectionId,
    events: mpsc::Sender<LoopEvent>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(LoopEvent::Disconnected { connection_id }).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec + Clone>(
    incoming: PendingUpgrade,
    codec: C,
    events: mpsc::Sender<LoopEvent>,
) {
    let connection_id = incoming.id();
    let peer = incoming.peer_addr();
    let conn = match incoming.establish().await {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            tracing::debug!(%connection_id, %peer, error = %e, "upgrade failed");
            return;
        }
    };
    tracing::debug!(%connection_id, %peer, "handling new connection");

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let mut writer = tokio::spawn(write_outbound(Arc::clone(&conn), codec.clone(), outbound_rx));

    if events
        .send(LoopEvent::Connected {
            connection_id,
            outbound: OutboundQueue::new(outbound_tx, writer.abort_handle()),
        })
        .await
        .is_err()
    {
        tracing::debug!(%connection_id, "authority loop gone, dropping connection");
        writer.abort();
        return;
    }
    let _guard = DisconnectGuard {
        connection_id,
        events: events.clone(),
    };

    loop {
        let received = tokio::select! {
            received = conn.recv() => received,
            // Closed by the server, aborted on overflow, or the send failed.
            _ = &mut writer => {
                tracing::debug!(%connection_id, "writer stopped, dropping connection");
                break;
            }
        };

        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%connection_id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                break;
            }
        };

        let message: ClientMessage = match codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "failed to decode client message");
                continue;
            }
        };

        if events
            .send(LoopEvent::Message {
                connection_id,
                message,
            })
            .await
            .is_err()
        {
            break;
        }
    }

    writer.abort();
    // _guard drops here → the loop forgets the connection. The last Arc
    // goes with `conn`, which shuts the socket.
}

/// Drains the outbound queue onto the transport, in order.
async fn write_outbound<C: Codec>(
    conn: Arc<WebSocketConnection>,
    codec: C,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    let connection_id = conn.id();

    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Message(message) => {
                let bytes = match codec.encode(&message) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(%connection_id, error = %e, "failed to encode server message");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%connection_id, error = %e, "send failed");
                    return;
                }
            }
            Outbound::Close { after } => {
                if !after.is_zero() {
                    tokio::time::sleep(after).await;
                }
                tracing::debug!(%connection_id, "closing connection");
                match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, conn.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(%connection_id, error = %e, "close failed"),
                    Err(_) => tracing::debug!(%connection_id, "close frame not flushed in time"),
                }
                return;
            }
        }
    }
}
