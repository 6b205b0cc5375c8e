//! Error taxonomy for the install-worker flow.
//!
//! Remote-originated failures are not errors of this crate: they are
//! recorded on the dialog as a [`SessionError`](super::SessionError) and
//! shown to the operator verbatim. The enums here cover local failures.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::api::ApiError;

use super::session::Phase;

/// Field-scoped validation failures; blocks a session from starting.
#[derive(Debug, Clone, Default, PartialEq, Error)]
#[error("installation request has {} invalid field(s)", .fields.len())]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.fields.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Transport-level failures of the provisioning channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("No credential available for the installation service")]
    MissingCredential,

    #[error("Credential cannot be sent as a header")]
    InvalidCredential,

    #[error("Invalid installation service endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Channel is closed")]
    Closed,

    #[error("Cannot connect to the installation service: {0}")]
    Connect(String),
}

/// A frame from the installation service that does not match any known
/// event schema.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not a JSON event envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("event `{0}` is produced locally and cannot arrive on the wire")]
    Reserved(String),

    #[error("payload of `{event}` does not match its schema: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

/// Operator actions the controller refused.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("`{action}` is not available while {phase}")]
    NotAllowed { action: &'static str, phase: Phase },

    #[error("A hardware asset must be chosen before the worker can be saved")]
    MissingHardwareId,
}

/// Failures of the provider/location resolver.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Unknown provider {0}")]
    UnknownProvider(i64),

    #[error("Unknown location {0} for the selected provider")]
    UnknownLocation(i64),

    #[error("Select a provider first")]
    NoProviderSelected,
}
