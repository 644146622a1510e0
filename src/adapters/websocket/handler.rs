//! WebSocket upgrade handler for sync connections.
//!
//! Bridges an axum socket to a [`ConnectionDriver`]:
//! 1. Upgrade to WebSocket
//! 2. Spawn a writer draining the connection's outbound queue
//! 3. Spawn a reader decoding text frames into [`ClientMessage`]s
//! 4. Run the driver until either side of the socket goes away
//! 5. Tear down and let the writer flush what is left

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::foundation::ErrorCode;

use super::connection::Connection;
use super::messages::{ClientMessage, ConnectionNotice, ServerMessage};
use super::session::{teardown, ConnectionDriver, SyncState};

/// How long the writer may keep flushing after the driver has finished.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes for the sync socket, mounted at `path` (`GET /sync` by default).
pub fn sync_router(path: &str) -> Router<SyncState> {
    Router::new().route(path, get(ws_handler))
}

/// Handle WebSocket upgrade requests.
///
/// Authentication happens in-band: the first frame must be `authenticate`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SyncState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: SyncState) {
    let (mut sink, mut stream) = socket.split();
    let (connection, mut outbound) = Connection::channel(state.settings.outbound_buffer);
    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientMessage>(state.settings.outbound_buffer);
    let connection_id = connection.id();

    tracing::debug!(connection_id = %connection_id, "Socket opened");

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = send_message(&mut sink, &message).await {
                tracing::debug!(connection_id = %connection_id, "Send error, closing connection: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_connection = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                    Ok(message) => {
                        if inbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(connection_id = %connection_id, "Malformed client message: {}", e);
                        let _ = reader_connection.try_deliver(ConnectionNotice::Error {
                            code: ErrorCode::ValidationFailed.to_string(),
                            message: e.to_string(),
                        });
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::warn!(connection_id = %connection_id, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // WebSocket protocol ping/pong - handled automatically by axum
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    });

    let mut driver_task = tokio::spawn(ConnectionDriver::new(state.clone(), connection.clone()).run(inbound_rx));

    // Wait for whichever side finishes first.
    let (driver_done, writer_done) = tokio::select! {
        _ = &mut driver_task => (true, false),
        _ = &mut recv_task => (false, false),
        _ = &mut send_task => (false, true),
    };

    // Dropping the reader closes the inbound channel, which ends the driver.
    recv_task.abort();
    if !driver_done {
        if let Err(e) = driver_task.await {
            tracing::error!(connection_id = %connection_id, "Connection driver panicked: {}", e);
        }
    }
    teardown(&state, &connection).await;
    drop(connection);

    // The outbound queue closes once every connection handle is gone.
    if !writer_done {
        let abort = send_task.abort_handle();
        if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
            abort.abort();
        }
    }

    tracing::debug!(connection_id = %connection_id, "Socket closed");
}

/// Serialize and send a message to the client.
async fn send_message<S>(sink: &mut S, message: &ServerMessage) -> Result<(), axum::Error>
where
    S: SinkExt<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}
