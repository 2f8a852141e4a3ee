use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::ServerMessage;
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;

/// WebSocket handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    debug!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Drive one socket until the peer goes away
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Everything bound for this client goes through one queue so that frames
    // are written in the order they were produced.
    let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
    let connection_id = app_state.registry.on_open(outbound).await;
    info!("WebSocket connection established: {}", connection_id);

    let writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });
    let abort_handle = writer.abort_handle();
    let _writer_guard = ScopeGuard::new(move || abort_handle.abort());

    let router = app_state.router.clone();
    let connected = ServerMessage::Connected { connection_id };
    if let Err(e) = router.registry.send(connection_id, &connected).await {
        warn!("Could not greet connection {}: {}", connection_id, e);
    }

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => router.handle_text(connection_id, &text).await,
            Ok(Message::Binary(_)) => router.handle_binary(connection_id).await,
            Ok(Message::Close(_)) => break,
            // Ping/pong frames are answered by the socket layer
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket read error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    router.close(connection_id).await;
    info!("WebSocket connection terminated: {}", connection_id);
}
