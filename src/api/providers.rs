use crate::models::Provider;
use super::client::{api_call, envelope_data};
use super::error::ApiError;

/// Load every provider known to the inventory.
pub async fn load_providers(
    client: &reqwest::Client,
    api_base_url: &str,
    api_token: &str,
) -> Result<Vec<Provider>, ApiError> {
    let params = vec![("per_page".to_string(), "1000".to_string())];
    let payload = api_call(
        client,
        api_base_url,
        api_token,
        "GET",
        "/v1/providers",
        None,
        Some(params),
    )
    .await;
    let data = envelope_data(payload)?;
    serde_json::from_value(data).map_err(|e| ApiError::Malformed(e.to_string()))
}
