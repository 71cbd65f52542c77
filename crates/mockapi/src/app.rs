//! Router and handlers for the mock backend.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;

use bottega_core::OrderId;
use bottega_clients::Client;
use bottega_orders::{Order, OrderStatus};

use crate::state::MockState;

/// Build the mock API router.
pub fn build_app(state: Arc<MockState>) -> Router {
    let protected = Router::new()
        .route("/api/ordini", get(list_orders).post(create_order))
        .route("/api/ordini/:id", get(get_order).put(update_order))
        .route("/api/clienti", get(list_clients).post(create_client))
        .route("/api/clienti/:id", put(update_client))
        .route("/api/dashboard/summary", get(dashboard_summary))
        .route("/api/whatsapp/status", get(whatsapp_status))
        .route("/api/magazzino/scorte-basse", get(low_stock))
        .route("/api/comunicazioni", get(list_comunicazioni).post(send_comunicazione))
        .route_layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(state.clone(), require_bearer)),
        );

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .with_state(state)
}

/// Bind an ephemeral local port and serve the app in a background task.
pub async fn serve(state: Arc<MockState>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock API listener");
    let addr = listener.local_addr().expect("listener has no local addr");

    let app = build_app(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "mock API server stopped");
        }
    });

    (addr, handle)
}

async fn require_bearer(
    State(state): State<Arc<MockState>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;
    if !state.is_token_valid(token) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if let Some(delay) = state.response_delay() {
        tokio::time::sleep(delay).await;
    }
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<Arc<MockState>>,
    Json(req): Json<LoginRequest>,
) -> Response {
    match state.login(&req.username, &req.password) {
        Some(session) => Json(session).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn list_orders(State(state): State<Arc<MockState>>) -> Json<Vec<Order>> {
    Json(state.orders_snapshot())
}

async fn get_order(
    State(state): State<Arc<MockState>>,
    Path(id): Path<OrderId>,
) -> Response {
    let orders = state.orders_snapshot();
    match orders.into_iter().find(|o| o.id == id) {
        Some(order) => Json(order).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_order(
    State(state): State<Arc<MockState>>,
    Json(order): Json<Order>,
) -> Response {
    let mut orders = state.orders.lock().unwrap();
    if let Some(existing) = orders.iter_mut().find(|o| o.id == order.id) {
        // Idempotent re-submission: replace.
        *existing = order.clone();
    } else {
        orders.push(order.clone());
    }
    (StatusCode::CREATED, Json(order)).into_response()
}

async fn update_order(
    State(state): State<Arc<MockState>>,
    Path(id): Path<OrderId>,
    Json(order): Json<Order>,
) -> Response {
    let mut orders = state.orders.lock().unwrap();
    match orders.iter_mut().find(|o| o.id == id) {
        Some(existing) => {
            *existing = order.clone();
            Json(order).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_clients(State(state): State<Arc<MockState>>) -> Json<Vec<Client>> {
    Json(state.clients_snapshot())
}

async fn create_client(
    State(state): State<Arc<MockState>>,
    Json(client): Json<Client>,
) -> Response {
    let mut clients = state.clients.lock().unwrap();
    if let Some(existing) = clients.iter_mut().find(|c| c.id == client.id) {
        *existing = client.clone();
    } else {
        clients.push(client.clone());
    }
    (StatusCode::CREATED, Json(client)).into_response()
}

async fn update_client(
    State(state): State<Arc<MockState>>,
    Path(id): Path<bottega_core::ClientId>,
    Json(client): Json<Client>,
) -> Response {
    let mut clients = state.clients.lock().unwrap();
    match clients.iter_mut().find(|c| c.id == id) {
        Some(existing) => {
            *existing = client.clone();
            Json(client).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Simulated dashboard: derived from whatever orders are in memory.
async fn dashboard_summary(State(state): State<Arc<MockState>>) -> Json<serde_json::Value> {
    let orders = state.orders_snapshot();
    let today = Utc::now().date_naive();

    let orders_today = orders
        .iter()
        .filter(|o| o.created_at.date_naive() == today)
        .count();
    let pending = orders
        .iter()
        .filter(|o| matches!(o.status, OrderStatus::New | OrderStatus::InProgress))
        .count();
    let revenue: i64 = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Completed)
        .map(Order::total)
        .sum();

    Json(json!({
        "ordersToday": orders_today,
        "pendingOrders": pending,
        "revenueToday": revenue,
    }))
}

/// Canned WhatsApp status.
async fn whatsapp_status() -> Json<serde_json::Value> {
    Json(json!({
        "connected": true,
        "phoneNumber": "+39 333 0000000",
        "lastSeen": Utc::now(),
    }))
}

/// Canned low-stock report.
async fn low_stock() -> Json<serde_json::Value> {
    Json(json!([
        { "name": "farina 00", "quantity": 4.0, "minimum": 25.0, "unit": "kg" },
        { "name": "lievito di birra", "quantity": 0.3, "minimum": 1.0, "unit": "kg" },
        { "name": "sale grosso", "quantity": 2.0, "minimum": 5.0, "unit": "kg" },
    ]))
}

async fn list_comunicazioni(State(state): State<Arc<MockState>>) -> Json<Vec<serde_json::Value>> {
    Json(state.comunicazioni.lock().unwrap().clone())
}

async fn send_comunicazione(
    State(state): State<Arc<MockState>>,
    Json(mut comunicazione): Json<serde_json::Value>,
) -> Response {
    if let Some(obj) = comunicazione.as_object_mut() {
        obj.entry("id")
            .or_insert_with(|| json!(uuid::Uuid::now_v7()));
        obj.insert("sentAt".to_string(), json!(Utc::now()));
    }
    state
        .comunicazioni
        .lock()
        .unwrap()
        .push(comunicazione.clone());
    (StatusCode::CREATED, Json(comunicazione)).into_response()
}
