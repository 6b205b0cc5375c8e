use urlencoding::encode;

use crate::models::{NewLocation, ProviderLocation};
use super::client::{api_call, envelope_data};
use super::error::ApiError;

fn locations_endpoint(provider_id: i64) -> String {
    format!("/v1/providers/{}/locations", encode(&provider_id.to_string()))
}

/// List the locations registered under a provider.
pub async fn load_locations(
    client: &reqwest::Client,
    api_base_url: &str,
    api_token: &str,
    provider_id: i64,
) -> Result<Vec<ProviderLocation>, ApiError> {
    let endpoint = locations_endpoint(provider_id);
    let payload = api_call(client, api_base_url, api_token, "GET", &endpoint, None, None).await;
    let data = envelope_data(payload)?;
    serde_json::from_value(data).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Persist a new location and return it as stored by the API.
pub async fn create_location(
    client: &reqwest::Client,
    api_base_url: &str,
    api_token: &str,
    provider_id: i64,
    location: &NewLocation,
) -> Result<ProviderLocation, ApiError> {
    let endpoint = locations_endpoint(provider_id);
    let body = serde_json::to_value(location).map_err(|e| ApiError::Malformed(e.to_string()))?;
    let payload = api_call(
        client,
        api_base_url,
        api_token,
        "POST",
        &endpoint,
        Some(body),
        None,
    )
    .await;
    let data = envelope_data(payload)?;
    serde_json::from_value(data).map_err(|e| ApiError::Malformed(e.to_string()))
}
