mod common;

use std::sync::Arc;

use common::{valid_form, valid_request};
use fleetdesk::provision::controller::SAVED_MESSAGE;
use fleetdesk::provision::{
    ChannelCommand, ChannelError, ChannelEvent, ChannelId, ChannelMessage, ControllerError,
    DialogOutcome, Dispatch, EventKind, InstallParams, LocationPicker, LoopbackConnector,
    MemorySink, Phase, ProvisioningController, SaveParams, SessionErrorKind, StaticToken,
};
use tokio::sync::mpsc;

struct Harness {
    controller: ProvisioningController,
    events: mpsc::UnboundedReceiver<ChannelMessage>,
    connector: LoopbackConnector,
    sink: Arc<MemorySink>,
}

fn harness_with_token(token: &str) -> Harness {
    let connector = LoopbackConnector::new();
    let sink = Arc::new(MemorySink::default());
    let (controller, events) = ProvisioningController::new(
        Arc::new(connector.clone()),
        Arc::new(StaticToken::new(token)),
        sink.clone(),
    );
    Harness {
        controller,
        events,
        connector,
        sink,
    }
}

fn harness() -> Harness {
    harness_with_token("secret")
}

impl Harness {
    /// Emit `event` on channel `id` and feed it to the controller.
    fn deliver(&mut self, id: ChannelId, event: ChannelEvent) -> Dispatch {
        assert!(self.connector.emit(id, event), "channel {} unknown", id);
        let message = self.events.try_recv().expect("event queued");
        self.controller.handle(message)
    }

    fn submit(&mut self) -> ChannelId {
        self.controller.submit(valid_request()).unwrap();
        self.connector.last_opened().expect("channel opened")
    }

    fn installed(&mut self) -> ChannelId {
        let id = self.submit();
        self.deliver(id, ChannelEvent::InstallSuccess);
        id
    }
}

fn params() -> InstallParams {
    InstallParams::from(&valid_request())
}

#[test]
fn test_round_trip_install_then_save() {
    let mut h = harness();
    assert_eq!(h.controller.phase(), Phase::Form);

    let id = h.submit();
    assert_eq!(h.controller.phase(), Phase::Installing);
    assert_eq!(h.connector.token(id).as_deref(), Some("secret"));
    assert_eq!(h.connector.sent(id), vec![ChannelCommand::RunInstall(params())]);

    h.deliver(id, ChannelEvent::Connect);
    h.deliver(id, ChannelEvent::Data("installing packages\n".into()));
    assert_eq!(h.sink.contents(), "installing packages\n");
    let session = h.controller.session().unwrap();
    assert_eq!(session.terminal().scrollback(), "installing packages\n");
    assert_eq!(h.controller.phase(), Phase::Installing);

    let dispatch = h.deliver(id, ChannelEvent::InstallSuccess);
    assert_eq!(
        dispatch,
        Dispatch::Applied {
            from: Phase::Installing,
            to: Phase::InstallSucceeded
        }
    );
    assert!(h.controller.can_commit());
    assert!(h.controller.session().unwrap().install_succeeded());
    assert!(!h.controller.session().unwrap().save_succeeded());

    h.controller.commit(Some(42)).unwrap();
    assert_eq!(h.controller.phase(), Phase::Saving);
    assert_eq!(
        h.connector.sent(id)[1],
        ChannelCommand::Save(SaveParams {
            install: params(),
            hardware_id: 42
        })
    );

    h.deliver(id, ChannelEvent::SaveSuccess);
    assert_eq!(h.controller.phase(), Phase::Saved);
    assert_eq!(
        h.controller.outcome(),
        Some(&DialogOutcome::Saved {
            message: SAVED_MESSAGE.to_string()
        })
    );
    assert!(h.controller.session().is_none());
    assert!(h.connector.is_closed(id));
    assert_eq!(h.sink.resets(), 1);
}

#[test]
fn test_worker_connect_error_returns_to_form_with_draft() {
    let mut h = harness();
    let id = h.submit();

    h.deliver(id, ChannelEvent::WorkerConnectError { error: "timeout".into() });
    assert_eq!(h.controller.phase(), Phase::Form);
    let error = h.controller.last_error().unwrap();
    assert_eq!(error.kind, SessionErrorKind::RemoteInstall);
    assert_eq!(error.message, "timeout");
    assert_eq!(h.controller.draft(), Some(&valid_request()));
    assert!(h.controller.session().is_none());
    assert!(h.connector.is_closed(id));

    // The operator can submit the kept values again on a fresh channel.
    let draft = h.controller.draft().cloned().unwrap();
    h.controller.submit(draft).unwrap();
    let second = h.connector.last_opened().unwrap();
    assert_ne!(second, id);
    assert_eq!(h.controller.phase(), Phase::Installing);
    assert!(h.controller.last_error().is_none());
}

#[test]
fn test_worker_exists_error_keeps_session_commit_eligible() {
    let mut h = harness();
    let id = h.installed();
    h.controller.commit(Some(7)).unwrap();

    h.deliver(id, ChannelEvent::WorkerExistsError {
        error: "duplicate host".into(),
    });
    assert_eq!(h.controller.phase(), Phase::InstallSucceeded);
    let error = h.controller.last_error().unwrap();
    assert_eq!(error.kind, SessionErrorKind::Conflict);
    assert_eq!(error.message, "duplicate host");
    assert!(h.controller.can_commit());
    assert!(h.controller.session().is_some());
    assert!(!h.connector.is_closed(id));

    h.controller.commit(Some(8)).unwrap();
    h.deliver(id, ChannelEvent::SaveError { error: "db down".into() });
    assert_eq!(h.controller.last_error().unwrap().kind, SessionErrorKind::Persistence);
    assert!(h.controller.can_commit());
}

#[test]
fn test_save_never_sent_before_install_success() {
    let mut h = harness();
    let id = h.submit();

    let err = h.controller.commit(Some(1)).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::NotAllowed {
            action: "commit",
            phase: Phase::Installing
        }
    ));

    assert_eq!(
        h.deliver(id, ChannelEvent::SaveSuccess),
        Dispatch::NotAllowed {
            phase: Phase::Installing,
            event: EventKind::SaveSuccess
        }
    );

    h.deliver(id, ChannelEvent::Disconnect);
    assert_eq!(h.controller.phase(), Phase::Interrupted);
    assert!(h.controller.commit(Some(1)).is_err());

    let sent = h.connector.sent(id);
    assert!(sent.iter().all(|c| !matches!(c, ChannelCommand::Save(_))));
}

#[test]
fn test_commit_needs_a_hardware_id() {
    let mut h = harness();
    let id = h.installed();
    assert!(matches!(h.controller.commit(None), Err(ControllerError::MissingHardwareId)));
    assert_eq!(h.controller.phase(), Phase::InstallSucceeded);
    assert_eq!(h.connector.sent(id).len(), 1);
}

#[test]
fn test_commit_falls_back_to_form_hardware_id() {
    let mut form = valid_form();
    form.hardware_id = Some("99".into());
    let request = fleetdesk::provision::validate_install_form(
        &form,
        Some(&common::acme()),
        Some(&common::bucharest()),
    )
    .unwrap();

    let mut h = harness();
    h.controller.submit(request).unwrap();
    let id = h.connector.last_opened().unwrap();
    h.deliver(id, ChannelEvent::InstallSuccess);
    h.controller.commit(None).unwrap();
    match &h.connector.sent(id)[1] {
        ChannelCommand::Save(save) => assert_eq!(save.hardware_id, 99),
        other => panic!("expected save, got {:?}", other),
    }
}

#[test]
fn test_cancel_is_idempotent_and_drops_later_events() {
    let mut h = harness();
    let id = h.submit();

    assert!(h.controller.cancel());
    assert_eq!(h.controller.phase(), Phase::Cancelled);
    assert_eq!(h.controller.outcome(), Some(&DialogOutcome::Cancelled));
    assert!(h.connector.is_closed(id));
    assert_eq!(h.sink.resets(), 1);

    assert!(!h.controller.cancel());
    assert_eq!(h.sink.resets(), 1);

    assert_eq!(h.deliver(id, ChannelEvent::InstallSuccess), Dispatch::Stale);
    assert_eq!(h.deliver(id, ChannelEvent::Data("late".into())), Dispatch::Stale);
    assert_eq!(h.controller.phase(), Phase::Cancelled);
    assert_eq!(h.sink.contents(), "");
}

#[test]
fn test_cancel_before_submit_then_submit_again() {
    let mut h = harness();
    assert!(h.controller.cancel());
    assert!(h.connector.opened().is_empty());
    h.controller.submit(valid_request()).unwrap();
    assert_eq!(h.controller.phase(), Phase::Installing);
    assert!(h.controller.outcome().is_none());
}

#[test]
fn test_reinstall_without_channel_is_a_noop() {
    let mut h = harness();
    assert!(!h.controller.reinstall().unwrap());
    assert!(h.connector.opened().is_empty());
    assert_eq!(h.controller.phase(), Phase::Form);
}

#[test]
fn test_reinstall_resends_identical_params() {
    let mut h = harness();
    let id = h.submit();
    // Still installing: nothing to do yet.
    assert!(!h.controller.reinstall().unwrap());

    h.deliver(id, ChannelEvent::InstallSuccess);
    assert!(h.controller.reinstall().unwrap());
    assert_eq!(h.controller.phase(), Phase::Installing);
    assert!(!h.controller.can_commit());
    assert_eq!(
        h.connector.sent(id),
        vec![ChannelCommand::RunInstall(params()), ChannelCommand::RunInstall(params())]
    );
    assert_eq!(h.controller.session().unwrap().install_attempts(), 2);

    h.deliver(id, ChannelEvent::Disconnect);
    assert_eq!(h.controller.phase(), Phase::Interrupted);
    assert!(h.controller.reinstall().unwrap());
    assert_eq!(h.connector.sent(id).len(), 3);
    assert_eq!(h.connector.opened(), vec![id]);
}

#[test]
fn test_reinstall_ignored_while_saving() {
    let mut h = harness();
    let id = h.installed();
    h.controller.commit(Some(3)).unwrap();
    assert!(!h.controller.reinstall().unwrap());
    assert_eq!(h.controller.phase(), Phase::Saving);
    assert_eq!(h.connector.sent(id).len(), 2);
}

#[test]
fn test_disconnect_while_saving_reenables_commit() {
    let mut h = harness();
    let id = h.installed();
    h.controller.commit(Some(3)).unwrap();

    h.deliver(id, ChannelEvent::Disconnect);
    assert_eq!(h.controller.phase(), Phase::InstallSucceeded);
    assert!(h.controller.can_commit());
    assert_eq!(h.controller.last_error().unwrap().kind, SessionErrorKind::Channel);

    // A save outcome arriving after the disconnect no longer applies.
    assert!(matches!(h.deliver(id, ChannelEvent::SaveSuccess), Dispatch::NotAllowed { .. }));

    h.deliver(id, ChannelEvent::Connect);
    assert!(h.controller.last_error().is_none());
}

#[test]
fn test_channel_errors_never_cancel_the_session() {
    let mut h = harness();
    let id = h.submit();
    h.deliver(id, ChannelEvent::ConnectError {
        message: "connection refused".into(),
    });
    assert_eq!(h.controller.phase(), Phase::Interrupted);
    assert_eq!(h.controller.last_error().unwrap().message, "connection refused");
    assert!(h.controller.can_reinstall());
    assert!(h.controller.session().unwrap().channel().is_lost());
    assert!(!h.connector.is_closed(id));
}

#[test]
fn test_reinstall_after_connect_error_reopens_the_channel() {
    let mut h = harness();
    let first = h.submit();
    h.deliver(first, ChannelEvent::ConnectError {
        message: "connection refused".into(),
    });

    assert!(h.controller.reinstall().unwrap());
    let second = h.connector.last_opened().unwrap();
    assert_ne!(second, first);
    assert_eq!(h.connector.opened(), vec![first, second]);
    assert!(h.connector.is_closed(first));
    assert_eq!(h.connector.token(second).as_deref(), Some("secret"));
    assert_eq!(h.connector.sent(second), vec![ChannelCommand::RunInstall(params())]);
    assert_eq!(h.controller.phase(), Phase::Installing);
    assert!(h.controller.last_error().is_none());
    assert_eq!(h.controller.session().unwrap().install_attempts(), 2);

    // Only the new channel is listened to; keystrokes follow it.
    assert_eq!(h.deliver(first, ChannelEvent::InstallSuccess), Dispatch::Stale);
    assert!(h.controller.input("y\n"));
    assert_eq!(h.connector.sent(second)[1], ChannelCommand::Data("y\n".into()));

    h.deliver(second, ChannelEvent::InstallSuccess);
    assert!(h.controller.can_commit());
}

#[test]
fn test_connect_error_after_disconnect_still_allows_reinstall() {
    let mut h = harness();
    let first = h.submit();
    h.deliver(first, ChannelEvent::Disconnect);
    assert_eq!(h.controller.phase(), Phase::Interrupted);
    h.deliver(first, ChannelEvent::ConnectError {
        message: "gave up".into(),
    });
    assert_eq!(h.controller.phase(), Phase::Interrupted);

    assert!(h.controller.reinstall().unwrap());
    let second = h.connector.last_opened().unwrap();
    assert_ne!(second, first);
    assert_eq!(h.connector.sent(second), vec![ChannelCommand::RunInstall(params())]);
}

#[test]
fn test_connect_error_while_saving_allows_commit_on_new_channel() {
    let mut h = harness();
    let first = h.installed();
    h.controller.commit(Some(3)).unwrap();
    h.deliver(first, ChannelEvent::ConnectError {
        message: "gave up".into(),
    });
    assert_eq!(h.controller.phase(), Phase::InstallSucceeded);
    assert!(h.controller.can_commit());

    h.controller.commit(Some(3)).unwrap();
    let second = h.connector.last_opened().unwrap();
    assert_ne!(second, first);
    assert_eq!(
        h.connector.sent(second),
        vec![ChannelCommand::Save(SaveParams {
            install: params(),
            hardware_id: 3,
        })]
    );
    assert_eq!(h.controller.phase(), Phase::Saving);
}

#[test]
fn test_failed_reopen_keeps_the_session_interrupted() {
    let mut h = harness();
    let first = h.submit();
    h.deliver(first, ChannelEvent::ConnectError {
        message: "gave up".into(),
    });
    h.connector.refuse_with(ChannelError::Connect("service unavailable".into()));

    let err = h.controller.reinstall().unwrap_err();
    assert!(matches!(err, ControllerError::Channel(ChannelError::Connect(_))));
    assert_eq!(h.controller.phase(), Phase::Interrupted);
    assert!(h.controller.session().is_some());
    assert_eq!(h.controller.last_error().unwrap().kind, SessionErrorKind::Channel);
}

#[test]
fn test_resubmit_uses_the_kept_draft() {
    let mut h = harness();
    assert!(matches!(
        h.controller.resubmit(),
        Err(ControllerError::NotAllowed { action: "resubmit", .. })
    ));

    let first = h.submit();
    h.deliver(first, ChannelEvent::WorkerConnectError {
        error: "timeout".into(),
    });
    h.controller.resubmit().unwrap();
    let second = h.connector.last_opened().unwrap();
    assert_ne!(second, first);
    assert_eq!(h.connector.sent(second), vec![ChannelCommand::RunInstall(params())]);
    assert_eq!(h.controller.phase(), Phase::Installing);
}

#[test]
fn test_install_not_ready_is_advisory() {
    let mut h = harness();
    let id = h.submit();
    h.deliver(id, ChannelEvent::InstallNotReady);
    assert_eq!(h.controller.phase(), Phase::Installing);
    assert!(h.controller.warning().is_some());
    assert!(h.controller.last_error().is_none());

    h.deliver(id, ChannelEvent::InstallSuccess);
    assert!(h.controller.warning().is_none());
}

#[test]
fn test_keystrokes_are_forwarded_as_data() {
    let mut h = harness();
    assert!(!h.controller.input("ls\r"));
    let id = h.submit();
    assert!(h.controller.input("ls\r"));
    assert_eq!(h.connector.sent(id)[1], ChannelCommand::Data("ls\r".into()));
}

#[test]
fn test_invalid_form_opens_no_channel() {
    let mut h = harness();
    let mut form = valid_form();
    form.ipv4 = Some("10.0.0.256".into());
    form.password = Some(String::new());

    let err = h.controller.submit_form(&form, &LocationPicker::new()).unwrap_err();
    match err {
        ControllerError::Validation(errors) => {
            assert!(errors.get("ipv4").is_some());
            assert!(errors.get("password").is_some());
            assert!(errors.get("location").is_some());
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(h.connector.opened().is_empty());
    assert_eq!(h.controller.phase(), Phase::Form);
}

#[test]
fn test_missing_credential_opens_no_channel() {
    let mut h = harness_with_token("");
    let err = h.controller.submit(valid_request()).unwrap_err();
    assert!(matches!(err, ControllerError::Channel(ChannelError::MissingCredential)));
    assert_eq!(h.controller.phase(), Phase::Form);
    assert_eq!(h.controller.last_error().unwrap().kind, SessionErrorKind::Channel);
    assert!(h.connector.opened().is_empty());
    assert_eq!(h.controller.draft(), Some(&valid_request()));
}

#[test]
fn test_refused_channel_stays_in_form() {
    let mut h = harness();
    h.connector.refuse_with(ChannelError::Connect("service unavailable".into()));
    let err = h.controller.submit(valid_request()).unwrap_err();
    assert!(matches!(err, ControllerError::Channel(ChannelError::Connect(_))));
    assert_eq!(h.controller.phase(), Phase::Form);
    assert_eq!(h.controller.last_error().unwrap().message, "service unavailable");
}

#[test]
fn test_submit_rejected_while_session_is_live() {
    let mut h = harness();
    h.submit();
    let err = h.controller.submit(valid_request()).unwrap_err();
    assert!(matches!(err, ControllerError::NotAllowed { action: "submit", .. }));
    assert_eq!(h.connector.opened().len(), 1);
}
