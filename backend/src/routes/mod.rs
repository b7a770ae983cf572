//! Route definitions for the concessions API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
///
/// Everything except `/health` requires a bearer token.
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/orders", order_routes())
        .nest("/inventory", inventory_routes())
        .nest("/sessions", session_routes())
        .nest("/purchases", purchase_routes())
        .nest("/menu-items", menu_routes())
        .nest("/programs", program_routes())
        .nest("/losses", loss_routes())
        .nest("/reimbursements", reimbursement_routes())
        .nest("/accounts", account_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .merge(protected)
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/:id", get(handlers::get_order))
}

fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_stock))
        .route("/count", post(handlers::record_count))
        .route("/transactions", get(handlers::list_inventory_transactions))
        .route("/drift", get(handlers::lot_drift_report))
        .route("/:id", get(handlers::get_stock))
        .route("/:id/adjust", post(handlers::adjust_inventory))
        .route("/:id/stock", post(handlers::add_stock))
        .route("/:id/lots", get(handlers::list_item_lots))
        .route("/:id/transactions", get(handlers::list_item_transactions))
}

fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sessions).post(handlers::create_session))
        .route("/:id", get(handlers::get_session))
        .route("/:id/start", post(handlers::start_session))
        .route("/:id/cancel", post(handlers::cancel_session))
        .route("/:id/close", post(handlers::close_session))
        .route("/:id/summary", get(handlers::session_summary))
}

fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_purchases).post(handlers::create_purchase))
        .route(
            "/:id",
            get(handlers::get_purchase).delete(handlers::delete_purchase),
        )
}

fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_menu_items).post(handlers::create_menu_item))
        .route(
            "/:id",
            get(handlers::get_menu_item).put(handlers::update_menu_item),
        )
        .route("/:id/components", put(handlers::set_menu_item_components))
}

fn program_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_programs).post(handlers::create_program))
        .route(
            "/:id",
            get(handlers::get_program).put(handlers::update_program),
        )
}

fn loss_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_losses).post(handlers::create_loss))
        .route("/:id", get(handlers::get_loss))
        .route("/:id/settle", post(handlers::settle_loss))
}

fn reimbursement_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_reimbursement_entries))
        .route("/summary", get(handlers::reimbursement_summary))
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_accounts))
        .route("/cashbox/deposit", post(handlers::deposit_cashbox))
        .route("/cashbox/reimburse", post(handlers::reimburse_from_cashbox))
        .route("/cashapp/withdraw", post(handlers::withdraw_cashapp))
}
