//! Contract with the remote installation service.
//!
//! Frames on the wire are JSON objects `{"event": <name>, "data": <payload>}`.
//! Event and command names are fixed by the service and must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::models::InstallationRequest;

use super::error::{ChannelError, ProtocolError};

/// Identifies one opened channel. Events carry the id of the channel they
/// came from so that a torn-down channel can never reach a newer session.
pub type ChannelId = u64;

/// Parameters of `run_install`, derived 1:1 from an [`InstallationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallParams {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub provider: String,
    pub port: u16,
    pub city: String,
    pub state: Option<String>,
    pub country: String,
    pub country_code: String,
    pub location_coordinates: String,
    pub location_address: String,
    pub location_internet_provider: String,
    pub location_contact_person: String,
    pub location_contact_phone: String,
}

impl From<&InstallationRequest> for InstallParams {
    fn from(request: &InstallationRequest) -> Self {
        Self {
            hostname: request.ipv4.to_string(),
            username: request.credentials.username.clone(),
            password: request.credentials.password.clone(),
            provider: request.provider.name.clone(),
            port: request.port,
            city: request.location.city.clone(),
            state: request.location.state.clone(),
            country: request.location.country.clone(),
            country_code: request.location.country_code.clone(),
            location_coordinates: request.location.coordinates(),
            location_address: request.address.clone(),
            location_internet_provider: request.provider.name.clone(),
            location_contact_person: request.contact.person.clone(),
            location_contact_phone: request.contact.phone.clone(),
        }
    }
}

/// Parameters of `save`: everything sent to `run_install` plus the asset id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveParams {
    #[serde(flatten)]
    pub install: InstallParams,
    pub hardware_id: u64,
}

/// Commands the controller sends to the installation service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelCommand {
    RunInstall(InstallParams),
    Save(SaveParams),
    Data(String),
}

impl ChannelCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelCommand::RunInstall(_) => "run_install",
            ChannelCommand::Save(_) => "save",
            ChannelCommand::Data(_) => "data",
        }
    }
}

/// Lifecycle events observed on a channel.
///
/// `Connect`, `Disconnect` and `ConnectError` are produced by the local
/// transport; the rest arrive as frames from the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Data(String),
    Connect,
    Disconnect,
    ConnectError { message: String },
    WorkerConnectError { error: String },
    InstallSuccess,
    WorkerExistsError { error: String },
    SaveError { error: String },
    SaveSuccess,
    InstallNotReady,
}

/// Payload-free discriminant of [`ChannelEvent`], used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Connect,
    Disconnect,
    ConnectError,
    WorkerConnectError,
    InstallSuccess,
    WorkerExistsError,
    SaveError,
    SaveSuccess,
    InstallNotReady,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Data => "data",
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::ConnectError => "connect_error",
            EventKind::WorkerConnectError => "worker_connect_error",
            EventKind::InstallSuccess => "install_success",
            EventKind::WorkerExistsError => "worker_exists_error",
            EventKind::SaveError => "save_error",
            EventKind::SaveSuccess => "save_success",
            EventKind::InstallNotReady => "install_not_ready",
        }
    }
}

#[derive(Deserialize)]
struct WireFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RemoteErrorPayload {
    error: String,
}

fn remote_error(event: &'static str, data: Value) -> Result<String, ProtocolError> {
    serde_json::from_value::<RemoteErrorPayload>(data)
        .map(|p| p.error)
        .map_err(|e| ProtocolError::InvalidPayload {
            event,
            reason: e.to_string(),
        })
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Data(_) => EventKind::Data,
            ChannelEvent::Connect => EventKind::Connect,
            ChannelEvent::Disconnect => EventKind::Disconnect,
            ChannelEvent::ConnectError { .. } => EventKind::ConnectError,
            ChannelEvent::WorkerConnectError { .. } => EventKind::WorkerConnectError,
            ChannelEvent::InstallSuccess => EventKind::InstallSuccess,
            ChannelEvent::WorkerExistsError { .. } => EventKind::WorkerExistsError,
            ChannelEvent::SaveError { .. } => EventKind::SaveError,
            ChannelEvent::SaveSuccess => EventKind::SaveSuccess,
            ChannelEvent::InstallNotReady => EventKind::InstallNotReady,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Decode one text frame from the installation service.
    pub fn decode_frame(text: &str) -> Result<Self, ProtocolError> {
        let frame: WireFrame = serde_json::from_str(text)?;
        match frame.event.as_str() {
            "data" => match frame.data {
                Value::String(chunk) => Ok(ChannelEvent::Data(chunk)),
                other => Err(ProtocolError::InvalidPayload {
                    event: "data",
                    reason: format!("expected a string chunk, got {}", other),
                }),
            },
            "worker_connect_error" => Ok(ChannelEvent::WorkerConnectError {
                error: remote_error("worker_connect_error", frame.data)?,
            }),
            "worker_exists_error" => Ok(ChannelEvent::WorkerExistsError {
                error: remote_error("worker_exists_error", frame.data)?,
            }),
            "save_error" => Ok(ChannelEvent::SaveError {
                error: remote_error("save_error", frame.data)?,
            }),
            "install_success" => Ok(ChannelEvent::InstallSuccess),
            "save_success" => Ok(ChannelEvent::SaveSuccess),
            "install_not_ready" => Ok(ChannelEvent::InstallNotReady),
            "connect" | "disconnect" | "connect_error" => Err(ProtocolError::Reserved(frame.event)),
            _ => Err(ProtocolError::UnknownEvent(frame.event)),
        }
    }
}

/// An event tagged with the channel it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub channel: ChannelId,
    pub event: ChannelEvent,
}

pub type EventSender = mpsc::UnboundedSender<ChannelMessage>;

/// Local handle of an open channel.
///
/// Sending never blocks: commands are queued for the transport task, and
/// their outcome is only observed through later events.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    lost: bool,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        commands: mpsc::UnboundedSender<ChannelCommand>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            commands,
            shutdown: Some(shutdown),
            lost: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }

    /// The transport gave up for good: nothing sent here can arrive, so a
    /// new channel is needed for further commands.
    pub fn is_lost(&self) -> bool {
        self.lost || self.commands.is_closed()
    }

    pub(crate) fn mark_lost(&mut self) {
        if !self.lost {
            tracing::debug!(channel = self.id, "channel marked lost");
            self.lost = true;
        }
    }

    pub fn send(&self, command: ChannelCommand) -> Result<(), ChannelError> {
        if self.is_closed() || self.is_lost() {
            return Err(ChannelError::Closed);
        }
        tracing::debug!(channel = self.id, command = command.name(), "sending command");
        self.commands.send(command).map_err(|_| ChannelError::Closed)
    }

    /// A sender for keystroke forwarding from the terminal.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<ChannelCommand> {
        self.commands.clone()
    }

    /// Close the local end without waiting for the remote side. Safe to call
    /// more than once.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            tracing::debug!(channel = self.id, "channel closed");
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens channels to the installation service.
///
/// `open` returns as soon as the handle exists; establishing the connection
/// happens in the background and is reported as `connect` or
/// `connect_error` on `events`.
pub trait ChannelConnector: Send + Sync {
    fn open(
        &self,
        id: ChannelId,
        bearer_token: String,
        events: EventSender,
    ) -> Result<Channel, ChannelError>;
}
