use axum::Router;
use tower_http::compression::CompressionLayer;

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/leaderboard",
            axum::routing::get(routes::leaderboard::get_leaderboard),
        )
        .route(
            "/api/leaderboard/state",
            axum::routing::get(routes::leaderboard::get_leaderboard_state),
        )
        .route(
            "/api/admin/refresh",
            axum::routing::post(routes::admin::trigger_refresh),
        )
        .route(
            "/api/admin/token",
            axum::routing::get(routes::admin::get_token).put(routes::admin::put_token),
        )
        .route("/api/health", axum::routing::get(routes::api::health))
        .route("/api/metrics", axum::routing::get(routes::api::metrics))
        .layer(CompressionLayer::new())
        .with_state(state)
}
