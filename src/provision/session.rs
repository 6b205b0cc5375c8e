use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::InstallationRequest;

use super::channel::{Channel, ChannelCommand, InstallParams};
use super::terminal::Terminal;

/// Phase of an install dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Collecting parameters; no channel exists.
    Form,
    /// Channel opened and `run_install` issued; waiting for its outcome.
    Installing,
    /// The channel dropped while an install was in flight.
    Interrupted,
    /// Install finished; the worker can be committed.
    InstallSucceeded,
    /// `save` issued; waiting for its outcome.
    Saving,
    Saved,
    Cancelled,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Form => "form",
            Phase::Installing => "installing",
            Phase::Interrupted => "interrupted",
            Phase::InstallSucceeded => "install succeeded",
            Phase::Saving => "saving",
            Phase::Saved => "saved",
            Phase::Cancelled => "cancelled",
        }
    }

    pub fn has_session(self) -> bool {
        matches!(
            self,
            Phase::Installing | Phase::Interrupted | Phase::InstallSucceeded | Phase::Saving
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Saved
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// Transport-level trouble; the operator decides whether to retry.
    Channel,
    /// The remote host could not be reached or the install command failed.
    RemoteInstall,
    /// `worker_exists_error`
    Conflict,
    /// `save_error`
    Persistence,
}

/// Last error shown in the dialog. Remote messages are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The live unit of work between form submission and commit or cancel.
pub struct ProvisioningSession {
    request: InstallationRequest,
    params: InstallParams,
    channel: Channel,
    terminal: Terminal,
    install_succeeded: bool,
    save_succeeded: bool,
    install_attempts: u32,
    started_at: DateTime<Utc>,
}

impl ProvisioningSession {
    pub(crate) fn new(request: InstallationRequest, channel: Channel, terminal: Terminal) -> Self {
        let params = InstallParams::from(&request);
        let mut session = Self {
            request,
            params,
            channel,
            terminal,
            install_succeeded: false,
            save_succeeded: false,
            install_attempts: 0,
            started_at: Utc::now(),
        };
        session.forward_keystrokes();
        session
    }

    /// Operator keystrokes go to the current channel as `data` commands.
    fn forward_keystrokes(&mut self) {
        let keystrokes = self.channel.command_sender();
        self.terminal.on_data(move |chunk| {
            let _ = keystrokes.send(ChannelCommand::Data(chunk.to_string()));
        });
    }

    /// Swap in a freshly opened channel after the old transport gave up.
    /// Terminal and scrollback stay; the old handle is closed.
    pub(crate) fn replace_channel(&mut self, channel: Channel) {
        self.channel.close();
        self.channel = channel;
        self.forward_keystrokes();
    }

    pub(crate) fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn request(&self) -> &InstallationRequest {
        &self.request
    }

    /// The parameters every `run_install` of this session uses.
    pub fn params(&self) -> &InstallParams {
        &self.params
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub(crate) fn terminal_mut(&mut self) -> &mut Terminal {
        &mut self.terminal
    }

    pub fn install_succeeded(&self) -> bool {
        self.install_succeeded
    }

    pub fn save_succeeded(&self) -> bool {
        self.save_succeeded
    }

    pub fn install_attempts(&self) -> u32 {
        self.install_attempts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn mark_install_started(&mut self) {
        self.install_succeeded = false;
        self.install_attempts += 1;
    }

    pub(crate) fn mark_install_succeeded(&mut self) {
        self.install_succeeded = true;
    }

    pub(crate) fn mark_saved(&mut self) {
        self.save_succeeded = true;
    }

    /// Close the channel and dispose the terminal. Idempotent.
    pub(crate) fn teardown(&mut self) {
        self.channel.close();
        self.terminal.dispose();
    }
}

impl Drop for ProvisioningSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
