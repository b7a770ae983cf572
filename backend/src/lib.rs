//! ASB concessions fund - backend
//!
//! Tracks concession-stand cash sessions, inventory with FIFO lot costing,
//! purchases, losses and the reimbursement ledger for student programs.

use axum::{routing::get, Router};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

pub use config::Config;

/// Process-wide write locks
///
/// SQLite allows one writer at a time. Holding these around a write
/// transaction makes concurrent requests queue in-process instead of
/// failing with `SQLITE_BUSY`, and keeps two sales of the same item from
/// reading the same open-lot snapshot. Lock order: `stock` before `cash`.
#[derive(Default)]
pub struct WriteLocks {
    /// Inventory, lots, purchases, orders, program balances and losses
    pub stock: Mutex<()>,
    /// Cashbox and CashApp balances
    pub cash: Mutex<()>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Arc<Config>,
    pub locks: Arc<WriteLocks>,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            locks: Arc::new(WriteLocks::default()),
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/", get(root))
        .nest("/api", routes::api_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout))
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "ASB Concessions API v1"
}
