use std::sync::Arc;

use crate::config::ProvisionConfig;
use crate::provision::{ApiLocationResolver, ChannelConnector, CredentialProvider};

#[derive(Clone)]
pub struct AppState {
    pub api_base_url: String,
    pub api_token: String,
    pub client: reqwest::Client,
    pub provision: ProvisionConfig,
    /// Opens the outbound installer channel for each dialog.
    pub connector: Arc<dyn ChannelConnector>,
    /// Bearer credential handed to the channel handshake.
    pub credentials: Arc<dyn CredentialProvider>,
}

impl AppState {
    pub fn resolver(&self) -> ApiLocationResolver {
        ApiLocationResolver::new(self.client.clone(), &self.api_base_url, &self.api_token)
    }
}
