use serde::{Deserialize, Serialize};

/// A physical site registered under a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderLocation {
    pub id: i64,
    #[serde(rename = "providerId")]
    pub provider_id: i64,
    #[serde(default)]
    pub continent: String,
    pub country: String,
    #[serde(rename = "countryCode", default)]
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub city: String,
    #[serde(rename = "dataCenter", default)]
    pub data_center: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl ProviderLocation {
    /// Coordinates in the `"<lat>,<lon>"` form the installer expects.
    pub fn coordinates(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    pub fn label(&self) -> String {
        if self.data_center.is_empty() {
            format!("{}/{}", self.city, self.country_code)
        } else {
            format!("{}/{} ({})", self.city, self.country_code, self.data_center)
        }
    }
}

/// Body of an inline "add location" request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLocation {
    pub continent: String,
    pub country: String,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub city: String,
    #[serde(rename = "dataCenter")]
    pub data_center: String,
    pub latitude: f64,
    pub longitude: f64,
}
