//! WebSocket handling for client connections.
//!
//! The lifecycle per connection: authenticate the `token` query parameter
//! (close `1008` on failure, nothing allocated), register, send `connected`,
//! subscribe to the user's delta subject, then run the read loop. Deltas
//! from the bus are forwarded as-is; per-message failures become `error`
//! messages on the open connection.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use wayfinder_shared::{ClientMessage, ServerMessage};

use crate::app::App;
use crate::infrastructure::ports::SubscriptionClosed;
use crate::use_cases::state::user_subject;

/// Buffer size for per-connection outbound channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Combined state for WebSocket handlers.
pub struct WsState {
    pub app: Arc<App>,
}

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<WsState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>, params: HashMap<String, String>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Authenticate before any server state is allocated.
    let token = params.get("token").map(String::as_str).unwrap_or("");
    let Some(experience) = params.get("experience").cloned().filter(|e| !e.is_empty())
    else {
        tracing::warn!("Connection rejected: no experience parameter");
        close_unauthenticated(&mut ws_sender).await;
        return;
    };
    let identity = match state.app.auth.authenticate(token) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected: authentication failed");
            close_unauthenticated(&mut ws_sender).await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    let user_id = identity.user_id.clone();

    // Bounded outbound channel; a client that cannot drain it is closed.
    let (tx, mut rx) = mpsc::channel::<String>(CONNECTION_CHANNEL_BUFFER);
    let closed = Arc::new(Notify::new());

    state
        .app
        .connections
        .register(connection_id, user_id.clone(), experience.clone(), tx.clone())
        .await;
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        experience = %experience,
        "WebSocket connection established"
    );

    // Forward messages from the channel to the WebSocket.
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Exactly one subscription per socket: relay every delta as-is.
    let forward_task = {
        let mut subscription = state.app.bus.subscribe(&user_subject(&user_id));
        let tx = tx.clone();
        let closed = closed.clone();
        tokio::spawn(async move {
            loop {
                match subscription.next().await {
                    Ok(payload) => {
                        if let Err(e) = tx.try_send(payload) {
                            tracing::warn!(
                                connection_id = %connection_id,
                                error = %e,
                                "Subscriber cannot keep up, closing connection"
                            );
                            closed.notify_one();
                            break;
                        }
                    }
                    Err(SubscriptionClosed::Lagged(missed)) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            missed,
                            "Subscriber lagged the bus, closing connection"
                        );
                        closed.notify_one();
                        break;
                    }
                    Err(SubscriptionClosed::Closed) => break,
                }
            }
        })
    };

    let welcome = ServerMessage::Connected {
        connection_id: connection_id.to_string(),
        user_id: user_id.clone(),
        experience: experience.clone(),
        server_time_ms: state.app.clock.now().timestamp_millis(),
    };
    send_or_close(&tx, &closed, &welcome);

    // Read loop: ends on disconnect, transport error, or a forced close.
    loop {
        let message = tokio::select! {
            message = ws_receiver.next() => message,
            _ = closed.notified() => {
                tracing::info!(connection_id = %connection_id, "Connection force-closed");
                break;
            }
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                handle_text(&state, connection_id, &user_id, &experience, &tx, &closed, &text)
                    .await;
            }
            Some(Ok(Message::Close(_))) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            None => break,
        }
    }

    // Clean up: unsubscribe and drop handles.
    state.app.connections.unregister(connection_id).await;
    forward_task.abort();
    send_task.abort();
    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch one inbound text frame.
async fn handle_text(
    state: &Arc<WsState>,
    connection_id: Uuid,
    user_id: &str,
    experience: &str,
    tx: &mpsc::Sender<String>,
    closed: &Arc<Notify>,
    text: &str,
) {
    let message = match ClientMessage::from_text(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(connection_id = %connection_id, code = %e.code, "Bad message");
            send_or_close(tx, closed, &ServerMessage::error(e.code, e.message));
            return;
        }
    };

    match message {
        ClientMessage::Ping => {
            send_or_close(tx, closed, &ServerMessage::Pong);
        }
        ClientMessage::UpdateLocation { lat, lng } => {
            if !lat.is_finite() || !lng.is_finite() {
                send_or_close(
                    tx,
                    closed,
                    &ServerMessage::error("processing_error", "Coordinates must be finite"),
                );
                return;
            }
            match state.app.aoi.build(experience, user_id, lat, lng).await {
                Ok(aoi) => send_or_close(tx, closed, &aoi),
                Err(e) => {
                    tracing::error!(connection_id = %connection_id, error = %e, "AOI failed");
                    send_or_close(
                        tx,
                        closed,
                        &ServerMessage::error("processing_error", "Could not build your view"),
                    );
                }
            }
        }
        ClientMessage::Action { action, data } => {
            // Actions may ride the slow path for seconds; process off the
            // read loop so pings and further messages stay live.
            let command = ClientMessage::command_data(&action, &data);
            let state = state.clone();
            let user_id = user_id.to_string();
            let experience = experience.to_string();
            let tx = tx.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                let result = state
                    .app
                    .dispatcher
                    .process_command(&user_id, &experience, command)
                    .await;
                send_or_close(&tx, &closed, &ServerMessage::ActionResponse { result });
            });
        }
    }
}

/// Serialize and enqueue one outbound message; a full channel forces the
/// connection closed (the client must reconnect and re-request its AOI).
fn send_or_close(tx: &mpsc::Sender<String>, closed: &Arc<Notify>, message: &ServerMessage) {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound message");
            return;
        }
    };
    if tx.try_send(text).is_err() {
        closed.notify_one();
    }
}

async fn close_unauthenticated(ws_sender: &mut SplitSink<WebSocket, Message>) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "unauthenticated".into(),
    };
    let _ = ws_sender.send(Message::Close(Some(frame))).await;
}
