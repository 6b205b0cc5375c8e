use super::error::ChannelError;

/// Source of the bearer credential sent with the channel handshake.
///
/// Injected into the controller so that nothing reads identity from
/// ambient global state at open time.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, ChannelError>;
}

/// A fixed token, typically `API_TOKEN` from the environment.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Result<String, ChannelError> {
        let token = self.0.trim();
        if token.is_empty() {
            Err(ChannelError::MissingCredential)
        } else {
            Ok(token.to_string())
        }
    }
}
