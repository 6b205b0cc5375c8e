use std::env;
use std::path::Path;
use std::time::Duration;

// Default configuration constants
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_API_BASE_URL: &str = "";
pub const DEFAULT_API_TOKEN: &str = "";
pub const DEFAULT_PROVISION_WS_URL: &str = "ws://localhost:5001/install";
pub const DEFAULT_MAX_RECONNECTS: u32 = 3;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_500;

pub fn load_env_file(env_file: Option<&str>) {
    if let Some(path) = env_file {
        dotenvy::from_path(Path::new(path)).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

pub fn get_api_base_url() -> String {
    let raw = env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    sanitize_base_url(&raw)
}

pub fn get_api_token() -> String {
    env::var("API_TOKEN").unwrap_or_else(|_| DEFAULT_API_TOKEN.to_string())
}

pub fn get_provision_ws_url() -> String {
    let raw = env::var("PROVISION_WS_URL").unwrap_or_default();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_PROVISION_WS_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn get_max_reconnects() -> u32 {
    env::var("PROVISION_MAX_RECONNECTS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_RECONNECTS)
}

pub fn get_reconnect_delay() -> Duration {
    let ms = env::var("PROVISION_RECONNECT_DELAY_MS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
    Duration::from_millis(ms)
}

/// Settings for the outbound provisioning channel.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub ws_url: String,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
}

impl ProvisionConfig {
    pub fn from_env() -> Self {
        Self {
            ws_url: get_provision_ws_url(),
            max_reconnects: get_max_reconnects(),
            reconnect_delay: get_reconnect_delay(),
        }
    }
}

pub fn sanitize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "http://localhost:5000".to_string()
    } else {
        trimmed.to_string()
    }
}
