use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::AppState;
use crate::provision::ResolverError;

/// Fields every page passes to `base.html`.
#[derive(Default)]
pub struct TemplateGlobals {
    pub api_hostname: String,
    pub flash_messages: Vec<String>,
    pub has_flash_messages: bool,
}

pub fn build_template_globals(state: &AppState, flash_messages: Vec<String>) -> TemplateGlobals {
    let has_flash_messages = !flash_messages.is_empty();
    TemplateGlobals {
        api_hostname: hostname_from_url(&state.api_base_url),
        flash_messages,
        has_flash_messages,
    }
}

/// Extract the host part of a URL for display.
pub fn hostname_from_url(u: &str) -> String {
    let s = u.trim();
    let s = s.split_once("://").map_or(s, |(_, rest)| rest);
    s.split('/').next().unwrap_or(s).to_string()
}

pub fn render_template<T: askama::Template>(t: T) -> Response {
    match t.render() {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::error!(%e, "Template render error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// JSON error body for a failed inventory lookup.
pub fn resolver_error_response(error: &ResolverError) -> Response {
    let status = match error {
        ResolverError::Api(_) => StatusCode::BAD_GATEWAY,
        ResolverError::UnknownProvider(_) | ResolverError::UnknownLocation(_) => {
            StatusCode::NOT_FOUND
        }
        ResolverError::NoProviderSelected => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
