//! Client notification channel over WebSocket.
//!
//! A client opens `GET /ws?client_id=<id>` and receives each notification as
//! a text frame. The session registers the connection with the service for
//! as long as the socket is open.

use std::fmt::Display;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use waddle_notify::{
    ChannelSink, ClientId, ConnectionHandle, NotificationService, NotificationSink,
    OutboundNotification, WriteError,
};

use super::notify_error_to_response;
use crate::server::AppState;

/// Notifications buffered between the service and the socket writer.
const OUTBOUND_BUFFER: usize = 32;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(notification_websocket_handler))
        .with_state(state)
}

/// Query parameters for the WebSocket upgrade
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub client_id: Option<String>,
}

/// GET /ws?client_id=<id>
///
/// Upgrades to a WebSocket that receives notifications for `client_id`.
async fn notification_websocket_handler(
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let client_id = match ClientId::parse(query.client_id.as_deref().unwrap_or_default()) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Rejected WebSocket connection");
            return notify_error_to_response(e).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    info!(client_id = %client_id, "Notification WebSocket connection request");

    ws.on_upgrade(move |socket| handle_notification_websocket(socket, client_id, state))
}

/// Handle an upgraded notification WebSocket
async fn handle_notification_websocket(socket: WebSocket, client_id: ClientId, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    run_session(
        sender,
        receiver,
        client_id,
        &state.service,
        state.shutdown.clone(),
    )
    .await;
}

/// Drive one client session until the socket closes.
///
/// Registers the connection, then serves notification writes from the
/// service and control frames from the peer on a single loop. The
/// connection is unregistered exactly once on every exit path.
///
/// A session superseded by a newer connection for the same client stays
/// open until its own peer closes it or the server shuts down; it simply
/// stops receiving notifications.
pub async fn run_session<W, R, E>(
    mut outbound: W,
    mut inbound: R,
    client_id: ClientId,
    service: &NotificationService,
    shutdown: CancellationToken,
) where
    W: Sink<Message, Error = E> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (sink, mut notifications) = ChannelSink::channel(OUTBOUND_BUFFER);
    // Held for the whole session so dropping the registry's handle on
    // supersede does not close the channel
    let sink = Arc::new(sink);
    let handle = ConnectionHandle::new(Arc::clone(&sink) as Arc<dyn NotificationSink>);
    let connection_id = handle.id();

    // Any on-connect replay runs detached and writes through `notifications`
    let _replay = service.connect(client_id.clone(), handle);
    info!(client_id = %client_id, connection_id = %connection_id, "Notification WebSocket connection established");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(client_id = %client_id, "Closing WebSocket for server shutdown");
                let _ = outbound.send(Message::Close(None)).await;
                break;
            }
            notification = notifications.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                if !write_notification(&mut outbound, notification).await {
                    break;
                }
            }
            frame = inbound.next() => {
                match frame {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = outbound.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Text(text))) => {
                        debug!(len = text.len(), "Ignoring client text frame");
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring client binary frame");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(client_id = %client_id, "WebSocket close requested");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(client_id = %client_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    service.disconnect(&client_id, connection_id);
    drop(sink);
    notifications.close();
    while let Ok(notification) = notifications.try_recv() {
        notification.complete(Err(WriteError::Closed));
    }

    info!(client_id = %client_id, connection_id = %connection_id, "Notification WebSocket connection closed");
}

/// Write one notification and report the result back to the dispatcher.
///
/// Returns `false` once the socket can no longer be written to.
async fn write_notification<W, E>(outbound: &mut W, notification: OutboundNotification) -> bool
where
    W: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    match outbound.send(Message::Text(notification.message.clone())).await {
        Ok(()) => {
            notification.complete(Ok(()));
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to write notification");
            notification.complete(Err(WriteError::transport(e.to_string())));
            false
        }
    }
}
