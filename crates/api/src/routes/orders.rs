//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use domain::Order;
use message_bus::MessageBus;
use orchestrator::OrderCommandService;
use order_store::OrderStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, B> {
    pub orders: OrderCommandService<S, B>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// A missing list is treated like an empty one.
    #[serde(default)]
    pub toppings: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

/// POST /orders: validate and create an order in PREPARING.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: OrderStore + 'static, B: MessageBus + 'static>(
    State(state): State<Arc<AppState<S, B>>>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(request) = body?;
    let created = state
        .orders
        .create_order(request.toppings.unwrap_or_default())
        .await?;
    Ok(Json(created.order))
}

/// GET /orders: every order with its current status.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static, B: MessageBus + 'static>(
    State(state): State<Arc<AppState<S, B>>>,
) -> Result<Json<OrdersResponse>, ApiError> {
    let orders = state.orders.list_orders().await?;
    Ok(Json(OrdersResponse { orders }))
}
