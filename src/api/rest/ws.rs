use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubscriptionScope {
    pub tenant_id: Uuid,
    pub request_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(scope): Query<SubscriptionScope>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, scope))
}

/// Events are filtered server-side against the subscription scope; a client
/// only ever sees its own tenant, optionally narrowed to one request or
/// trip. Per-request ordering follows broadcast-channel send order.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, scope: SubscriptionScope) {
    let (mut sender, mut receiver) = socket.split();
    let rx = state.events_tx.subscribe();

    info!(tenant_id = %scope.tenant_id, "websocket client connected");

    let send_task = tokio::spawn(async move {
        let mut stream = BroadcastStream::new(rx);
        while let Some(Ok(event)) = stream.next().await {
            if !event.matches(scope.tenant_id, scope.request_id, scope.trip_id) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
