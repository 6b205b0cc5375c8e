use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;

use crate::handlers;
use crate::handlers::install::DIALOG_WS_PATH;
use crate::models::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { axum::response::Redirect::to("/workers/install") }))
        .route("/workers/install", get(handlers::install_page))
        .route("/workers/install/validate", post(handlers::validate_post))
        .route(DIALOG_WS_PATH, get(handlers::install_ws))
        .route("/providers", get(handlers::providers_get))
        .route(
            "/providers/:id/locations",
            get(handlers::locations_get).post(handlers::locations_post),
        )
        // Serve static files with cache-control header
        .nest_service(
            "/static",
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=31536000, immutable"),
                ))
                .service(ServeDir::new("static")),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
