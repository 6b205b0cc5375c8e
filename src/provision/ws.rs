use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ProvisionConfig;

use super::channel::{
    Channel, ChannelCommand, ChannelConnector, ChannelEvent, ChannelId, ChannelMessage,
    EventSender,
};
use super::error::ChannelError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket transport to the installation service.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: ProvisionConfig,
}

impl WsConnector {
    pub fn new(config: ProvisionConfig) -> Self {
        Self { config }
    }
}

fn build_request(url: &str, token: &str) -> Result<Request, ChannelError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ChannelError::InvalidEndpoint(e.to_string()))?;
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ChannelError::InvalidCredential)?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

impl ChannelConnector for WsConnector {
    fn open(
        &self,
        id: ChannelId,
        bearer_token: String,
        events: EventSender,
    ) -> Result<Channel, ChannelError> {
        // Fail fast on a bad endpoint or credential instead of inside the task.
        build_request(&self.config.ws_url, &bearer_token)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = Transport {
            id,
            url: self.config.ws_url.clone(),
            token: bearer_token,
            max_reconnects: self.config.max_reconnects,
            reconnect_delay: self.config.reconnect_delay,
            events,
        };
        runtime.spawn(task.run(command_rx, shutdown_rx));
        Ok(Channel::new(id, command_tx, shutdown_tx))
    }
}

enum PumpExit {
    Shutdown,
    /// The connection dropped. `delivered` is false when the service never
    /// sent a single frame on it.
    Lost { reason: String, delivered: bool },
}

struct Transport {
    id: ChannelId,
    url: String,
    token: String,
    max_reconnects: u32,
    reconnect_delay: Duration,
    events: EventSender,
}

impl Transport {
    /// Returns false once nobody listens for this channel's events anymore.
    fn emit(&self, event: ChannelEvent) -> bool {
        self.events
            .send(ChannelMessage {
                channel: self.id,
                event,
            })
            .is_ok()
    }

    /// Connect, pump frames and reconnect until shut down.
    ///
    /// `failures` counts consecutive attempts that ended without the
    /// service sending anything: refused connects as well as connections
    /// dropped before the first frame. Past `max_reconnects` the transport
    /// emits `connect_error` and stops for good.
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut failures = 0u32;
        loop {
            let request = match build_request(&self.url, &self.token) {
                Ok(r) => r,
                Err(e) => {
                    self.emit(ChannelEvent::ConnectError { message: e.to_string() });
                    return;
                }
            };
            let connected = tokio::select! {
                _ = &mut shutdown => return,
                result = tokio_tungstenite::connect_async(request) => result,
            };
            let failed = match connected {
                Ok((socket, _response)) => {
                    tracing::info!(
                        channel = self.id,
                        url = %self.url,
                        "connected to installation service"
                    );
                    if !self.emit(ChannelEvent::Connect) {
                        return;
                    }
                    match self.pump(socket, &mut commands, &mut shutdown).await {
                        PumpExit::Shutdown => return,
                        PumpExit::Lost { reason, delivered } => {
                            tracing::warn!(
                                channel = self.id,
                                %reason,
                                "installation service connection lost"
                            );
                            if !self.emit(ChannelEvent::Disconnect) {
                                return;
                            }
                            (!delivered).then_some(reason)
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        channel = self.id,
                        attempt = failures + 1,
                        error = %e,
                        "connect attempt failed"
                    );
                    Some(e.to_string())
                }
            };
            match failed {
                Some(message) => {
                    failures += 1;
                    if failures > self.max_reconnects {
                        tracing::error!(channel = self.id, "giving up after {} attempts", failures);
                        self.emit(ChannelEvent::ConnectError { message });
                        return;
                    }
                }
                None => failures = 0,
            }
            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    async fn pump(
        &self,
        socket: Socket,
        commands: &mut mpsc::UnboundedReceiver<ChannelCommand>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> PumpExit {
        let (mut sink, mut stream) = socket.split();
        let mut delivered = false;
        let lost = |reason: String, delivered: bool| PumpExit::Lost { reason, delivered };
        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        let _ = sink.send(Message::Close(None)).await;
                        return PumpExit::Shutdown;
                    };
                    let text = match serde_json::to_string(&command) {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!(channel = self.id, %e, "failed to encode command");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        return lost(e.to_string(), delivered);
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        delivered = true;
                        match ChannelEvent::decode_frame(&text) {
                            Ok(event) => {
                                if !self.emit(event) {
                                    return PumpExit::Shutdown;
                                }
                            }
                            Err(e) => tracing::warn!(
                                channel = self.id,
                                error = %e,
                                "dropping unrecognized frame"
                            ),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return lost("closed by remote".into(), delivered);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        delivered = true;
                        tracing::warn!(channel = self.id, "dropping binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return lost(e.to_string(), delivered),
                },
            }
        }
    }
}
