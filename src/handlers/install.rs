//! Install-worker dialog for the web console.
//!
//! One websocket connection is one dialog: the browser sends operator
//! actions, the handler runs a [`ProvisioningController`] for them and
//! streams dialog snapshots and terminal output back.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{stream::SplitStream, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use crate::models::{AppState, NewLocation, Provider, ProviderLocation};
use crate::provision::{
    run_dialog, validate_install_form, ControllerError, DialogAction, DialogObserver, DialogOutcome,
    DialogSnapshot, LocationPicker, LocationResolver, ProvisioningController, RawInstallForm,
    TerminalSink,
};
use crate::templates::InstallWorkerTemplate;

use super::helpers::{build_template_globals, render_template, TemplateGlobals};

pub const DIALOG_WS_PATH: &str = "/workers/install/ws";

/// Messages sent to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogFrame {
    State { snapshot: DialogSnapshot },
    Output { chunk: String },
    /// The terminal was disposed; clear the display.
    Reset,
    Providers { providers: Vec<Provider> },
    Locations { locations: Vec<ProviderLocation> },
    LocationSelected { location: ProviderLocation },
    Validation { errors: BTreeMap<String, String> },
    Error { message: String },
    Closed {
        #[serde(flatten)]
        outcome: DialogOutcome,
    },
}

/// Messages received from the browser.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserMessage {
    SelectProvider { provider_id: i64 },
    SelectLocation { location_id: i64 },
    CreateLocation { location: NewLocation },
    Submit { form: RawInstallForm },
    Commit {
        #[serde(default)]
        hardware_id: Option<u64>,
    },
    Reinstall,
    Cancel,
    Input { data: String },
}

pub async fn install_page(State(state): State<AppState>) -> Response {
    let (providers, load_error) = match state.resolver().list_providers().await {
        Ok(providers) => (providers, None),
        Err(e) => {
            tracing::warn!(error = %e, "could not load providers for install page");
            (Vec::new(), Some(e.to_string()))
        }
    };
    let TemplateGlobals {
        api_hostname,
        flash_messages,
        has_flash_messages,
    } = build_template_globals(&state, Vec::new());
    render_template(InstallWorkerTemplate {
        api_hostname,
        flash_messages,
        has_flash_messages,
        providers,
        load_error,
        ws_path: DIALOG_WS_PATH,
    })
}

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub provider_id: Option<i64>,
    pub location_id: Option<i64>,
    #[serde(flatten)]
    pub form: RawInstallForm,
}

/// Validate a form without starting anything.
///
/// Answers `200 {"valid": true}` or `422 {"valid": false, "errors": {...}}`.
pub async fn validate_post(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Response {
    let resolver = state.resolver();
    let mut picker = LocationPicker::new();
    let mut lookup_errors = BTreeMap::new();
    if let Some(provider_id) = body.provider_id {
        if let Err(e) = picker.select_provider(&resolver, provider_id).await {
            lookup_errors.insert("provider".to_string(), e.to_string());
        }
    }
    if let Some(location_id) = body.location_id {
        if picker.provider().is_some() {
            if let Err(e) = picker.select_location(location_id) {
                lookup_errors.insert("location".to_string(), e.to_string());
            }
        }
    }

    let mut errors = match validate_install_form(&body.form, picker.provider(), picker.location()) {
        Ok(_) => BTreeMap::new(),
        Err(e) => e.fields,
    };
    errors.extend(lookup_errors);
    if errors.is_empty() {
        Json(json!({ "valid": true, "errors": {} })).into_response()
    } else {
        tracing::debug!(fields = errors.len(), "install form rejected");
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "valid": false, "errors": errors })),
        )
            .into_response()
    }
}

pub async fn install_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_dialog_socket(socket, state))
}

/// Terminal output goes to the browser as frames.
struct DialogSink {
    frames: mpsc::UnboundedSender<DialogFrame>,
}

impl TerminalSink for DialogSink {
    fn render(&self, chunk: &str) {
        let _ = self.frames.send(DialogFrame::Output {
            chunk: chunk.to_string(),
        });
    }

    fn reset(&self) {
        let _ = self.frames.send(DialogFrame::Reset);
    }
}

struct WsObserver {
    frames: mpsc::UnboundedSender<DialogFrame>,
}

impl DialogObserver for WsObserver {
    fn changed(&mut self, snapshot: &DialogSnapshot) {
        let _ = self.frames.send(DialogFrame::State {
            snapshot: snapshot.clone(),
        });
    }

    fn rejected(&mut self, error: &ControllerError) {
        let _ = self.frames.send(DialogFrame::Error {
            message: error.to_string(),
        });
    }
}

async fn handle_dialog_socket(socket: WebSocket, state: AppState) {
    let (mut sender, receiver) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<DialogFrame>();
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<DialogAction>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%e, "failed to encode dialog frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
            if matches!(frame, DialogFrame::Closed { .. }) {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let reader = tokio::spawn(read_browser(
        receiver,
        state.resolver(),
        frame_tx.clone(),
        action_tx,
    ));

    let sink = Arc::new(DialogSink {
        frames: frame_tx.clone(),
    });
    let (mut controller, mut events) =
        ProvisioningController::new(state.connector.clone(), state.credentials.clone(), sink);
    let mut observer = WsObserver {
        frames: frame_tx.clone(),
    };
    let outcome = run_dialog(&mut controller, &mut events, &mut action_rx, &mut observer).await;
    drop(controller);

    tracing::info!(?outcome, "install dialog finished");
    let _ = frame_tx.send(DialogFrame::Closed { outcome });
    drop(frame_tx);
    reader.abort();
    let _ = writer.await;
}

/// Translate browser messages into dialog actions.
///
/// Provider and location selection is answered here directly; only
/// actions that concern the controller are forwarded.
async fn read_browser<R: LocationResolver>(
    mut receiver: SplitStream<WebSocket>,
    resolver: R,
    frames: mpsc::UnboundedSender<DialogFrame>,
    actions: mpsc::UnboundedSender<DialogAction>,
) {
    let mut picker = LocationPicker::new();
    let first = match picker.load_providers(&resolver).await {
        Ok(providers) => DialogFrame::Providers {
            providers: providers.to_vec(),
        },
        Err(e) => DialogFrame::Error {
            message: e.to_string(),
        },
    };
    let _ = frames.send(first);

    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let parsed: BrowserMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed dialog message");
                let _ = frames.send(DialogFrame::Error {
                    message: format!("Malformed message: {}", e),
                });
                continue;
            }
        };
        if let Some(action) = browser_action(&mut picker, &resolver, parsed, &frames).await {
            if actions.send(action).is_err() {
                return;
            }
        }
    }
    let _ = actions.send(DialogAction::Close);
}

async fn browser_action<R: LocationResolver>(
    picker: &mut LocationPicker,
    resolver: &R,
    message: BrowserMessage,
    frames: &mpsc::UnboundedSender<DialogFrame>,
) -> Option<DialogAction> {
    let reply = match message {
        BrowserMessage::SelectProvider { provider_id } => {
            match picker.select_provider(resolver, provider_id).await {
                Ok(locations) => DialogFrame::Locations {
                    locations: locations.to_vec(),
                },
                Err(e) => DialogFrame::Error {
                    message: e.to_string(),
                },
            }
        }
        BrowserMessage::SelectLocation { location_id } => {
            match picker.select_location(location_id) {
                Ok(location) => DialogFrame::LocationSelected {
                    location: location.clone(),
                },
                Err(e) => DialogFrame::Error {
                    message: e.to_string(),
                },
            }
        }
        BrowserMessage::CreateLocation { location } => {
            match picker.create_location(resolver, &location).await {
                Ok(location) => DialogFrame::LocationSelected {
                    location: location.clone(),
                },
                Err(e) => DialogFrame::Error {
                    message: e.to_string(),
                },
            }
        }
        BrowserMessage::Submit { form } => {
            match validate_install_form(&form, picker.provider(), picker.location()) {
                Ok(request) => return Some(DialogAction::Submit(Box::new(request))),
                Err(e) => DialogFrame::Validation { errors: e.fields },
            }
        }
        BrowserMessage::Commit { hardware_id } => return Some(DialogAction::Commit { hardware_id }),
        BrowserMessage::Reinstall => return Some(DialogAction::Reinstall),
        BrowserMessage::Cancel => return Some(DialogAction::Cancel),
        BrowserMessage::Input { data } => return Some(DialogAction::Input(data)),
    };
    let _ = frames.send(reply);
    None
}
