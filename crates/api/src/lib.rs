//! HTTP API server and process wiring for the order service.
//!
//! Provides `POST /orders` and `GET /orders`, starts the outcome listeners,
//! and exposes structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use message_bus::{BusError, MessageBus, RunningSubscriptions, SubscriptionRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{OrderCommandService, OrderEventOrchestrator, Timeouts};
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, B>(state: Arc<AppState<S, B>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + 'static,
    B: MessageBus + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            get(routes::orders::list::<S, B>).post(routes::orders::create::<S, B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the command service state and the outcome orchestrator over one
/// store and one bus.
pub fn create_default_state<S, B>(
    store: S,
    bus: B,
    config: &Config,
) -> (Arc<AppState<S, B>>, Arc<OrderEventOrchestrator<S>>)
where
    S: OrderStore + Clone + 'static,
    B: MessageBus + 'static,
{
    let timeouts = Timeouts {
        store: config.store_timeout,
        publish: config.publish_timeout,
    };
    let orders = OrderCommandService::with_timeouts(store.clone(), bus, timeouts);
    let orchestrator = Arc::new(OrderEventOrchestrator::with_store_timeout(
        store,
        config.store_timeout,
    ));

    (Arc::new(AppState { orders }), orchestrator)
}

/// Subscribes the orchestrator to `order_ready` and `order_failed`.
pub async fn start_listeners<S, B>(
    orchestrator: &Arc<OrderEventOrchestrator<S>>,
    bus: &B,
    config: &Config,
) -> Result<RunningSubscriptions, BusError>
where
    S: OrderStore + 'static,
    B: MessageBus,
{
    let mut registry = SubscriptionRegistry::new(config.consumer_group.as_str())
        .with_concurrency(config.listener_concurrency);
    orchestrator.register(&mut registry)?;
    registry.start(bus).await
}
