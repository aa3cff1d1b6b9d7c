use std::path::Path;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState, static_dir: &Path) -> Router {
    let static_assets = ServeDir::new(static_dir)
        .precompressed_br()
        .precompressed_gzip();

    let app = Router::new()
        .route("/api/config", axum::routing::get(routes::api::get_config))
        .route(
            "/api/selection",
            axum::routing::get(routes::api::get_selection),
        )
        .route(
            "/api/choropleth",
            axum::routing::get(routes::api::get_choropleth),
        )
        .route("/api/health", axum::routing::get(routes::api::health))
        .route("/api/metrics", axum::routing::get(routes::api::metrics));

    app.layer(CompressionLayer::new())
        .fallback_service(static_assets)
        .with_state(state)
}
