pub mod courier;
pub mod customer;
pub mod orders;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(courier::router())
        .merge(customer::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws/courier", get(ws::courier_socket))
        .route("/ws/customer", get(ws::customer_socket))
        .layer(TimeoutLayer::new(state.request_timeout))
        .with_state(state)
}

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(serde::Deserialize)]
pub(crate) struct PageQuery {
    page: Option<usize>,
    limit: Option<usize>,
}

impl PageQuery {
    /// Normalized (page, limit, offset) with a 1-based page and a clamped
    /// page size.
    pub(crate) fn bounds(&self) -> (usize, usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit, (page - 1) * limit)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    couriers: usize,
    courier_sockets: usize,
    customer_sockets: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.store.order_count(),
        couriers: state.store.courier_count(),
        courier_sockets: state.hub.connected_couriers().await,
        customer_sockets: state.hub.connected_customers().await,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
