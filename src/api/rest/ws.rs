use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::auth::Principal;
use crate::error::AppError;
use crate::realtime::events::{self, InboundFrame, LocationUpdate, OrderSyncPayload};
use crate::state::AppState;

pub async fn courier_socket(
    ws: WebSocketUpgrade,
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let courier_id = principal.require_courier()?;
    Ok(ws.on_upgrade(move |socket| handle_courier_socket(socket, state, courier_id)))
}

pub async fn customer_socket(
    ws: WebSocketUpgrade,
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let customer_id = principal.require_customer()?;
    Ok(ws.on_upgrade(move |socket| handle_customer_socket(socket, state, customer_id)))
}

async fn handle_courier_socket(socket: WebSocket, state: Arc<AppState>, courier_id: Uuid) {
    let (sink, mut stream) = socket.split();
    let conn = state.hub.register_courier(courier_id, sink).await;
    state
        .metrics
        .connected_sockets
        .with_label_values(&["courier"])
        .inc();
    info!(courier_id = %courier_id, "courier socket attached");

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<InboundFrame>(&text) else {
            continue;
        };
        match frame.event.as_str() {
            events::LOCATION_UPDATE => {
                let Ok(update) = serde_json::from_value::<LocationUpdate>(frame.data) else {
                    continue;
                };
                if let Err(err) =
                    state
                        .store
                        .update_location(courier_id, update.latitude, update.longitude)
                {
                    warn!(courier_id = %courier_id, error = %err, "location update rejected");
                }
            }
            _ => {}
        }
    }

    state.hub.unregister_courier(courier_id, conn).await;
    state
        .metrics
        .connected_sockets
        .with_label_values(&["courier"])
        .dec();
    info!(courier_id = %courier_id, "courier socket detached");
}

async fn handle_customer_socket(socket: WebSocket, state: Arc<AppState>, customer_id: Uuid) {
    let (sink, mut stream) = socket.split();
    let conn = state.hub.register_customer(customer_id, sink).await;
    state
        .metrics
        .connected_sockets
        .with_label_values(&["customer"])
        .inc();
    info!(customer_id = %customer_id, "customer socket attached");

    // Push the active-order snapshot right away: any status change emitted
    // between the client's last query and this attach is covered by it.
    let orders = state.store.list_active_for_customer(customer_id);
    state
        .hub
        .notify_customer(customer_id, events::ORDER_SYNC, &OrderSyncPayload { orders })
        .await;

    // No inbound customer events exist yet; drain until the peer goes away.
    while let Some(Ok(_message)) = stream.next().await {}

    state.hub.unregister_customer(customer_id, conn).await;
    state
        .metrics
        .connected_sockets
        .with_label_values(&["customer"])
        .dec();
    info!(customer_id = %customer_id, "customer socket detached");
}
