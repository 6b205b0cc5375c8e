use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Serialize;

use super::{Provider, ProviderLocation};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Clone, PartialEq, Serialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SiteContact {
    pub person: String,
    pub phone: String,
}

/// Validated parameters for one provisioning attempt.
///
/// Only the validator builds these, so holding one means every required
/// field passed its checks and a concrete location was chosen.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstallationRequest {
    pub ipv4: Ipv4Addr,
    pub ipv6: Option<Ipv6Addr>,
    pub port: u16,
    pub credentials: Credentials,
    pub provider: Provider,
    pub location: ProviderLocation,
    pub contact: SiteContact,
    pub address: String,
    pub hardware_id: Option<u64>,
}
