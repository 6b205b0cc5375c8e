use askama::Template;

use crate::models::Provider;

#[derive(Template)]
#[template(path = "install_worker.html")]
pub struct InstallWorkerTemplate {
    pub api_hostname: String,
    pub flash_messages: Vec<String>,
    pub has_flash_messages: bool,
    pub providers: Vec<Provider>,
    /// Set when the provider list could not be loaded.
    pub load_error: Option<String>,
    pub ws_path: &'static str,
}
