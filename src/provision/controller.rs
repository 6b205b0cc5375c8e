//! Session controller of the install-worker dialog.
//!
//! The controller is driven from a single task: operator actions and
//! channel events are applied one at a time, in arrival order. Every
//! incoming event is checked against [`accepts`] before it may change
//! anything.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;

use super::channel::{
    Channel, ChannelCommand, ChannelConnector, ChannelEvent, ChannelId, ChannelMessage, EventKind,
    EventSender, SaveParams,
};
use super::credentials::CredentialProvider;
use super::error::{ChannelError, ControllerError};
use super::location::LocationPicker;
use super::session::{Phase, ProvisioningSession, SessionError, SessionErrorKind};
use super::terminal::{Terminal, TerminalSink};
use super::validator::{validate_install_form, RawInstallForm};
use crate::models::InstallationRequest;

pub const SAVED_MESSAGE: &str = "Worker installed and saved to inventory";
pub const DISCONNECTED_MESSAGE: &str = "Connection to the installation service was lost";
pub const INSTALL_NOT_READY_MESSAGE: &str = "The installation service is not ready yet";

/// How a dialog ended, as reported to whoever opened it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DialogOutcome {
    Saved { message: String },
    Cancelled,
    Closed,
}

/// Result of feeding one channel message to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Applied { from: Phase, to: Phase },
    /// The message came from a channel that is no longer live.
    Stale,
    /// The transition table has no entry for this event in this phase.
    NotAllowed { phase: Phase, event: EventKind },
}

/// Allowed-transition table: may `event` be handled while in `phase`?
pub fn accepts(phase: Phase, event: EventKind) -> bool {
    match (phase, event) {
        (
            _,
            EventKind::Data
            | EventKind::Connect
            | EventKind::Disconnect
            | EventKind::ConnectError
            | EventKind::InstallNotReady,
        ) => phase.has_session(),
        (
            Phase::Installing | Phase::Interrupted,
            EventKind::WorkerConnectError | EventKind::InstallSuccess,
        ) => true,
        (
            Phase::Saving,
            EventKind::WorkerExistsError | EventKind::SaveError | EventKind::SaveSuccess,
        ) => true,
        _ => false,
    }
}

/// What the dialog should show right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogSnapshot {
    pub phase: Phase,
    pub last_error: Option<SessionError>,
    pub warning: Option<String>,
    pub can_submit: bool,
    pub can_commit: bool,
    pub can_reinstall: bool,
    pub can_cancel: bool,
    pub install_attempts: u32,
    pub hardware_id: Option<u64>,
}

pub struct ProvisioningController {
    phase: Phase,
    draft: Option<InstallationRequest>,
    session: Option<ProvisioningSession>,
    last_error: Option<SessionError>,
    warning: Option<String>,
    outcome: Option<DialogOutcome>,
    connector: Arc<dyn ChannelConnector>,
    credentials: Arc<dyn CredentialProvider>,
    sink: Arc<dyn TerminalSink>,
    events: EventSender,
    next_channel: ChannelId,
}

impl ProvisioningController {
    /// Build a controller for one dialog. Channel events for it arrive on
    /// the returned receiver and must be passed back through [`handle`].
    ///
    /// [`handle`]: ProvisioningController::handle
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        credentials: Arc<dyn CredentialProvider>,
        sink: Arc<dyn TerminalSink>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            phase: Phase::Form,
            draft: None,
            session: None,
            last_error: None,
            warning: None,
            outcome: None,
            connector,
            credentials,
            sink,
            events,
            next_channel: 1,
        };
        (controller, receiver)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&ProvisioningSession> {
        self.session.as_ref()
    }

    /// Values of the last submitted request, kept across failed attempts.
    pub fn draft(&self) -> Option<&InstallationRequest> {
        self.draft.as_ref()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn outcome(&self) -> Option<&DialogOutcome> {
        self.outcome.as_ref()
    }

    pub fn can_commit(&self) -> bool {
        self.phase == Phase::InstallSucceeded
            && self.session.as_ref().is_some_and(|s| s.install_succeeded())
    }

    pub fn can_reinstall(&self) -> bool {
        self.session.is_some() && matches!(self.phase, Phase::Interrupted | Phase::InstallSucceeded)
    }

    pub fn snapshot(&self) -> DialogSnapshot {
        DialogSnapshot {
            phase: self.phase,
            last_error: self.last_error.clone(),
            warning: self.warning.clone(),
            can_submit: matches!(self.phase, Phase::Form | Phase::Cancelled),
            can_commit: self.can_commit(),
            can_reinstall: self.can_reinstall(),
            can_cancel: !matches!(self.phase, Phase::Saved | Phase::Cancelled),
            install_attempts: self.session.as_ref().map_or(0, |s| s.install_attempts()),
            hardware_id: self.draft.as_ref().and_then(|d| d.hardware_id),
        }
    }

    fn set_phase(&mut self, to: Phase, cause: &str) {
        if self.phase != to {
            tracing::info!(from = %self.phase, to = %to, cause, "install dialog phase changed");
            self.phase = to;
        }
    }

    fn open_channel(&mut self) -> Result<Channel, ChannelError> {
        let token = self.credentials.bearer_token()?;
        let id = self.next_channel;
        self.next_channel += 1;
        self.connector.open(id, token, self.events.clone())
    }

    /// Replace the session's channel when its transport has given up, so
    /// the next command reaches the service on a new connection.
    fn ensure_live_channel(&mut self) -> Result<(), ControllerError> {
        let Some(old) = self.session.as_ref().map(|s| s.channel()) else {
            return Ok(());
        };
        if !old.is_lost() {
            return Ok(());
        }
        let old_id = old.id();
        let channel = match self.open_channel() {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "could not reopen installation channel");
                self.last_error = Some(SessionError::new(SessionErrorKind::Channel, e.to_string()));
                return Err(e.into());
            }
        };
        tracing::info!(old = old_id, new = channel.id(), "installation channel reopened");
        if let Some(session) = self.session.as_mut() {
            session.replace_channel(channel);
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
    }

    /// Validate raw form values against the picker's selection and submit.
    /// Nothing is opened when validation fails.
    pub fn submit_form(
        &mut self,
        form: &RawInstallForm,
        picker: &LocationPicker,
    ) -> Result<(), ControllerError> {
        let request = validate_install_form(form, picker.provider(), picker.location())?;
        self.submit(request)
    }

    /// Start a session: open the channel and issue `run_install`.
    pub fn submit(&mut self, request: InstallationRequest) -> Result<(), ControllerError> {
        if !matches!(self.phase, Phase::Form | Phase::Cancelled) {
            return Err(ControllerError::NotAllowed {
                action: "submit",
                phase: self.phase,
            });
        }
        self.draft = Some(request.clone());
        self.last_error = None;
        self.warning = None;
        self.outcome = None;

        let channel = match self.open_channel() {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "could not open installation channel");
                self.last_error = Some(SessionError::new(SessionErrorKind::Channel, e.to_string()));
                self.set_phase(Phase::Form, "open failed");
                return Err(e.into());
            }
        };

        let terminal = Terminal::attach(self.sink.clone());
        let mut session = ProvisioningSession::new(request, channel, terminal);
        session.mark_install_started();
        let run_install = ChannelCommand::RunInstall(session.params().clone());
        if let Err(e) = session.channel().send(run_install) {
            self.last_error = Some(SessionError::new(SessionErrorKind::Channel, e.to_string()));
            self.set_phase(Phase::Form, "run_install not sent");
            return Err(e.into());
        }
        tracing::info!(
            channel = session.channel().id(),
            host = %session.request().ipv4,
            provider = %session.request().provider.name,
            "run_install issued"
        );
        self.session = Some(session);
        self.set_phase(Phase::Installing, "submit");
        Ok(())
    }

    /// Submit the kept draft again, typically after `worker_connect_error`
    /// sent the dialog back to the form.
    pub fn resubmit(&mut self) -> Result<(), ControllerError> {
        match self.draft.clone() {
            Some(request) => self.submit(request),
            None => Err(ControllerError::NotAllowed {
                action: "resubmit",
                phase: self.phase,
            }),
        }
    }

    /// Ask the service to persist the installed worker.
    ///
    /// `hardware_id` overrides the asset chosen on the form, if any.
    pub fn commit(&mut self, hardware_id: Option<u64>) -> Result<(), ControllerError> {
        if !self.can_commit() {
            return Err(ControllerError::NotAllowed {
                action: "commit",
                phase: self.phase,
            });
        }
        let hardware_id = hardware_id
            .or(self.draft.as_ref().and_then(|d| d.hardware_id))
            .ok_or(ControllerError::MissingHardwareId)?;
        self.ensure_live_channel()?;
        let Some(session) = self.session.as_ref() else {
            return Err(ControllerError::NotAllowed {
                action: "commit",
                phase: self.phase,
            });
        };
        let save = ChannelCommand::Save(SaveParams {
            install: session.params().clone(),
            hardware_id,
        });
        if let Err(e) = session.channel().send(save) {
            self.last_error = Some(SessionError::new(SessionErrorKind::Channel, e.to_string()));
            return Err(e.into());
        }
        tracing::info!(channel = session.channel().id(), hardware_id, "save issued");
        self.last_error = None;
        self.set_phase(Phase::Saving, "commit");
        Ok(())
    }

    /// Re-send `run_install` with the session's stored parameters.
    ///
    /// Returns `Ok(false)` without doing anything when there is no channel,
    /// while an install is still running, or while a save is in flight. A
    /// channel whose transport gave up is reopened first.
    pub fn reinstall(&mut self) -> Result<bool, ControllerError> {
        if !self.can_reinstall() {
            tracing::debug!(phase = %self.phase, "reinstall ignored");
            return Ok(false);
        }
        self.ensure_live_channel()?;
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let run_install = ChannelCommand::RunInstall(session.params().clone());
        if let Err(e) = session.channel().send(run_install) {
            self.last_error = Some(SessionError::new(SessionErrorKind::Channel, e.to_string()));
            return Err(e.into());
        }
        session.mark_install_started();
        tracing::info!(
            channel = session.channel().id(),
            attempt = session.install_attempts(),
            "run_install re-issued"
        );
        self.last_error = None;
        self.warning = None;
        self.set_phase(Phase::Installing, "reinstall");
        Ok(true)
    }

    /// Abandon the session: detach listeners, close the channel and dispose
    /// the terminal without waiting for the remote side. Returns false when
    /// there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if matches!(self.phase, Phase::Saved | Phase::Cancelled) {
            return false;
        }
        self.teardown();
        self.last_error = None;
        self.warning = None;
        self.outcome = Some(DialogOutcome::Cancelled);
        self.set_phase(Phase::Cancelled, "cancel");
        true
    }

    /// Forward operator keystrokes to the remote terminal.
    pub fn input(&mut self, chunk: &str) -> bool {
        match self.session.as_mut() {
            Some(session) => session.terminal_mut().input(chunk),
            None => false,
        }
    }

    /// Apply one channel event.
    pub fn handle(&mut self, message: ChannelMessage) -> Dispatch {
        let live = self.session.as_ref().map(|s| s.channel().id());
        if live != Some(message.channel) {
            tracing::debug!(
                channel = message.channel,
                event = message.event.name(),
                "dropping event from stale channel"
            );
            return Dispatch::Stale;
        }
        let kind = message.event.kind();
        let from = self.phase;
        if !accepts(from, kind) {
            tracing::warn!(
                phase = %from,
                event = kind.name(),
                "event not allowed in this phase; ignored"
            );
            return Dispatch::NotAllowed { phase: from, event: kind };
        }

        match message.event {
            ChannelEvent::Data(chunk) => {
                if let Some(session) = self.session.as_mut() {
                    session.terminal_mut().write(&chunk);
                }
            }
            ChannelEvent::Connect => {
                if self
                    .last_error
                    .as_ref()
                    .is_some_and(|e| e.kind == SessionErrorKind::Channel)
                {
                    self.last_error = None;
                }
            }
            ChannelEvent::Disconnect => {
                self.last_error =
                    Some(SessionError::new(SessionErrorKind::Channel, DISCONNECTED_MESSAGE));
                match from {
                    Phase::Installing => self.set_phase(Phase::Interrupted, "disconnect"),
                    Phase::Saving => self.set_phase(Phase::InstallSucceeded, "disconnect"),
                    _ => {}
                }
            }
            ChannelEvent::ConnectError { message } => {
                // The transport has stopped retrying; nothing more will
                // arrive on this channel.
                tracing::warn!(%message, "installation channel error");
                if let Some(session) = self.session.as_mut() {
                    session.channel_mut().mark_lost();
                }
                self.last_error = Some(SessionError::new(SessionErrorKind::Channel, message));
                match from {
                    Phase::Installing => self.set_phase(Phase::Interrupted, "connect_error"),
                    Phase::Saving => self.set_phase(Phase::InstallSucceeded, "connect_error"),
                    _ => {}
                }
            }
            ChannelEvent::WorkerConnectError { error } => {
                tracing::warn!(%error, "remote install could not reach the host");
                self.teardown();
                self.warning = None;
                self.last_error = Some(SessionError::new(SessionErrorKind::RemoteInstall, error));
                self.set_phase(Phase::Form, "worker_connect_error");
            }
            ChannelEvent::InstallSuccess => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_install_succeeded();
                }
                self.last_error = None;
                self.warning = None;
                self.set_phase(Phase::InstallSucceeded, "install_success");
            }
            ChannelEvent::WorkerExistsError { error } => {
                tracing::warn!(%error, "worker already exists");
                self.last_error = Some(SessionError::new(SessionErrorKind::Conflict, error));
                self.set_phase(Phase::InstallSucceeded, "worker_exists_error");
            }
            ChannelEvent::SaveError { error } => {
                tracing::warn!(%error, "worker could not be saved");
                self.last_error = Some(SessionError::new(SessionErrorKind::Persistence, error));
                self.set_phase(Phase::InstallSucceeded, "save_error");
            }
            ChannelEvent::SaveSuccess => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_saved();
                    let elapsed = Utc::now() - session.started_at();
                    tracing::info!(
                        attempts = session.install_attempts(),
                        elapsed_secs = elapsed.num_seconds(),
                        "worker saved"
                    );
                }
                self.teardown();
                self.last_error = None;
                self.warning = None;
                self.outcome = Some(DialogOutcome::Saved {
                    message: SAVED_MESSAGE.to_string(),
                });
                self.set_phase(Phase::Saved, "save_success");
            }
            ChannelEvent::InstallNotReady => {
                tracing::warn!("installation service reported install_not_ready");
                self.warning = Some(INSTALL_NOT_READY_MESSAGE.to_string());
            }
        }
        Dispatch::Applied { from, to: self.phase }
    }
}
