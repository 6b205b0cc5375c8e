use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::{AppState, NewLocation};
use crate::provision::{LocationResolver, ResolverError};

use super::helpers::resolver_error_response;

pub async fn providers_get(State(state): State<AppState>) -> Response {
    match state.resolver().list_providers().await {
        Ok(providers) => Json(providers).into_response(),
        Err(e) => resolver_error_response(&ResolverError::from(e)),
    }
}

pub async fn locations_get(
    State(state): State<AppState>,
    Path(provider_id): Path<i64>,
) -> Response {
    match state.resolver().list_locations(provider_id).await {
        Ok(locations) => Json(locations).into_response(),
        Err(e) => resolver_error_response(&ResolverError::from(e)),
    }
}

pub async fn locations_post(
    State(state): State<AppState>,
    Path(provider_id): Path<i64>,
    Json(body): Json<NewLocation>,
) -> Response {
    match state.resolver().create_location(provider_id, &body).await {
        Ok(location) => {
            tracing::info!(provider_id, location_id = location.id, "location created from console");
            (StatusCode::CREATED, Json(location)).into_response()
        }
        Err(e) => resolver_error_response(&ResolverError::from(e)),
    }
}
