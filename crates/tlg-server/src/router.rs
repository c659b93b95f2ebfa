use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with every ledger endpoint mounted under `prefix`.
pub fn build_router(state: AppState, prefix: &str) -> Router {
    let api = Router::new()
        .route("/health", get(handler::health_handler))
        .route("/network/health", get(handler::health_handler))
        .route("/info", get(handler::info_handler))
        .route("/statistics", get(handler::statistics_handler))
        .route(
            "/threats",
            get(handler::list_handler).post(handler::create_handler),
        )
        .route(
            "/threats/:log_id",
            get(handler::get_handler)
                .put(handler::update_handler)
                .delete(handler::delete_handler),
        )
        .route("/threats/:log_id/history", get(handler::history_handler))
        .route("/threats/:log_id/verify", post(handler::verify_handler))
        .route("/blocks/latest", get(handler::latest_block_handler))
        .route("/blocks/:n", get(handler::block_handler))
        .route("/chain/verify", get(handler::chain_verify_handler))
        .with_state(state);

    let prefix = prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };
    app.layer(TraceLayer::new_for_http())
}
