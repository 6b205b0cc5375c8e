//! In-process connector that never leaves the machine.
//!
//! Every opened channel is kept so the caller can inspect the commands the
//! controller sent and whether the handle was closed. Used to drive the
//! controller without a running installation service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use super::channel::{
    Channel, ChannelCommand, ChannelConnector, ChannelId, ChannelMessage, EventSender,
};
use super::error::ChannelError;

struct OpenedChannel {
    token: String,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    shutdown: oneshot::Receiver<()>,
    sent: Vec<ChannelCommand>,
    events: EventSender,
}

#[derive(Default)]
struct LoopbackState {
    opened: Vec<ChannelId>,
    channels: HashMap<ChannelId, OpenedChannel>,
    refuse_with: Option<ChannelError>,
}

#[derive(Clone, Default)]
pub struct LoopbackConnector {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `open` fail with `error`.
    pub fn refuse_with(&self, error: ChannelError) {
        self.state.lock().unwrap().refuse_with = Some(error);
    }

    pub fn opened(&self) -> Vec<ChannelId> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn last_opened(&self) -> Option<ChannelId> {
        self.state.lock().unwrap().opened.last().copied()
    }

    pub fn token(&self, id: ChannelId) -> Option<String> {
        self.state.lock().unwrap().channels.get(&id).map(|c| c.token.clone())
    }

    /// Every command sent on `id` so far, in order.
    pub fn sent(&self, id: ChannelId) -> Vec<ChannelCommand> {
        let mut state = self.state.lock().unwrap();
        let Some(channel) = state.channels.get_mut(&id) else {
            return Vec::new();
        };
        while let Ok(command) = channel.commands.try_recv() {
            channel.sent.push(command);
        }
        channel.sent.clone()
    }

    pub fn is_closed(&self, id: ChannelId) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.channels.get_mut(&id) {
            Some(channel) => !matches!(
                channel.shutdown.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            ),
            None => true,
        }
    }

    /// Deliver an event as if the service had emitted it on channel `id`.
    pub fn emit(&self, id: ChannelId, event: super::ChannelEvent) -> bool {
        let state = self.state.lock().unwrap();
        match state.channels.get(&id) {
            Some(channel) => channel.events.send(ChannelMessage { channel: id, event }).is_ok(),
            None => false,
        }
    }
}

impl ChannelConnector for LoopbackConnector {
    fn open(
        &self,
        id: ChannelId,
        bearer_token: String,
        events: EventSender,
    ) -> Result<Channel, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.refuse_with.clone() {
            return Err(error);
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        state.opened.push(id);
        state.channels.insert(
            id,
            OpenedChannel {
                token: bearer_token,
                commands: command_rx,
                shutdown: shutdown_rx,
                sent: Vec::new(),
                events,
            },
        );
        Ok(Channel::new(id, command_tx, shutdown_tx))
    }
}
