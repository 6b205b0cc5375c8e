pub mod app_state;
pub mod installation_request;
pub mod provider;
pub mod provider_location;

pub use app_state::AppState;
pub use installation_request::{Credentials, InstallationRequest, SiteContact, DEFAULT_SSH_PORT};
pub use provider::Provider;
pub use provider_location::{NewLocation, ProviderLocation};
