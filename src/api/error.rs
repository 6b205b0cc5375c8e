use thiserror::Error;

/// Errors raised while talking to the inventory API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a usable response.
    #[error("{0}")]
    Transport(String),

    /// The API answered with a non-OKAY envelope.
    #[error("API rejected the request: {0}")]
    Rejected(String),

    /// The envelope was OKAY but `data` did not have the expected shape.
    #[error("Unexpected response shape: {0}")]
    Malformed(String),
}
