use tokio::sync::mpsc;

use crate::models::InstallationRequest;

use super::channel::ChannelMessage;
use super::controller::{DialogOutcome, DialogSnapshot, ProvisioningController};
use super::error::ControllerError;

/// Operator actions delivered to a running dialog.
#[derive(Debug)]
pub enum DialogAction {
    Submit(Box<InstallationRequest>),
    /// Submit the last request again without re-entering it.
    Resubmit,
    Commit { hardware_id: Option<u64> },
    Reinstall,
    Cancel,
    Input(String),
    /// The dialog is going away; tears down whatever is live.
    Close,
}

/// Receives what the operator should see.
pub trait DialogObserver {
    fn changed(&mut self, snapshot: &DialogSnapshot);

    fn rejected(&mut self, error: &ControllerError) {
        let _ = error;
    }
}

fn apply(
    controller: &mut ProvisioningController,
    action: DialogAction,
) -> Result<(), ControllerError> {
    match action {
        DialogAction::Submit(request) => controller.submit(*request),
        DialogAction::Resubmit => controller.resubmit(),
        DialogAction::Commit { hardware_id } => controller.commit(hardware_id),
        DialogAction::Reinstall => controller.reinstall().map(|_| ()),
        DialogAction::Cancel => {
            controller.cancel();
            Ok(())
        }
        DialogAction::Input(chunk) => {
            controller.input(&chunk);
            Ok(())
        }
        DialogAction::Close => Ok(()),
    }
}

/// Run one dialog until it is saved or closed.
///
/// Actions and channel events are applied strictly one at a time, so the
/// controller never sees two transitions interleave. The observer is told
/// about every change of the dialog snapshot.
pub async fn run_dialog<O: DialogObserver>(
    controller: &mut ProvisioningController,
    events: &mut mpsc::UnboundedReceiver<ChannelMessage>,
    actions: &mut mpsc::UnboundedReceiver<DialogAction>,
    observer: &mut O,
) -> DialogOutcome {
    let mut last = controller.snapshot();
    observer.changed(&last);
    loop {
        tokio::select! {
            action = actions.recv() => {
                let action = match action {
                    Some(DialogAction::Close) | None => {
                        let outcome = match controller.outcome() {
                            Some(DialogOutcome::Cancelled) => DialogOutcome::Cancelled,
                            _ => DialogOutcome::Closed,
                        };
                        controller.cancel();
                        tracing::info!(?outcome, "install dialog closed");
                        return outcome;
                    }
                    Some(action) => action,
                };
                if let Err(e) = apply(controller, action) {
                    tracing::warn!(error = %e, "dialog action rejected");
                    observer.rejected(&e);
                }
            }
            Some(message) = events.recv() => {
                controller.handle(message);
            }
        }
        let snapshot = controller.snapshot();
        if snapshot != last {
            observer.changed(&snapshot);
            last = snapshot;
        }
        if controller.phase().is_terminal() {
            if let Some(outcome) = controller.outcome() {
                return outcome.clone();
            }
        }
    }
}
