use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use super::*;
use crate::{photo::MAX_PHOTO_BYTES, transport::NETWORK_FAILURE_MESSAGE};

enum Step {
    Reply(ServerReply),
    Fail(SubmissionError),
    After(Duration, ServerReply),
    Hang,
}

struct TestTransport {
    steps: std::sync::Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<EnquiryPayload>>>,
}

impl TestTransport {
    fn scripted(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: std::sync::Mutex::new(steps.into_iter().collect()),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn ok() -> Self {
        Self::scripted([Step::Reply(ServerReply {
            error: None,
            message: Some("Enquiry received".into()),
        })])
    }

    fn failing(error: SubmissionError) -> Self {
        Self::scripted([Step::Fail(error)])
    }

    fn hanging() -> Self {
        Self::scripted([Step::Hang])
    }
}

#[async_trait]
impl EnquiryTransport for TestTransport {
    async fn send(&self, payload: EnquiryPayload) -> Result<ServerReply, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().await.push(payload);

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Hang);
        match step {
            Step::Reply(reply) => Ok(reply),
            Step::Fail(error) => Err(error),
            Step::After(delay, reply) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
            Step::Hang => futures::future::pending().await,
        }
    }
}

fn fast_config() -> SubmissionConfig {
    SubmissionConfig {
        request_timeout: Duration::from_secs(5),
        progress_tick: Duration::from_millis(20),
        ack_delay: Duration::from_millis(40),
        ..SubmissionConfig::default()
    }
}

struct Harness {
    controller: Arc<SubmissionController>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<EnquiryPayload>>>,
}

async fn harness(transport: TestTransport, config: SubmissionConfig) -> Harness {
    let calls = Arc::clone(&transport.calls);
    let seen = Arc::clone(&transport.seen);
    let controller = SubmissionController::new(Arc::new(transport), config);
    Harness {
        controller,
        calls,
        seen,
    }
}

async fn fill_required(controller: &SubmissionController) {
    for (field, value) in [
        (FormField::ChildName, "rahul"),
        (FormField::DateOfBirth, "2015-05-01"),
        (FormField::Sex, "MALE"),
        (FormField::ContactNumber, "9894886733"),
        (FormField::ContactType, "FATHER"),
        (FormField::ClassAdmission, "LKG"),
        (FormField::TcAttached, "NO"),
        (FormField::HowKnow, "friends"),
    ] {
        controller.update_field(field, value).await.unwrap();
    }
}

fn small_photo(name: &str) -> PhotoFile {
    PhotoFile::new(name, "image/png", b"png-bytes".to_vec())
}

fn drain(rx: &mut broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn submit_with_empty_required_fields_sends_nothing() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    h.controller
        .update_field(FormField::ChildName, "rahul")
        .await
        .unwrap();

    let err = h.controller.submit().await.err().expect("rejected");
    match err {
        SubmitRejected::MissingRequired(missing) => {
            assert!(missing.contains(&FormField::DateOfBirth));
            assert!(!missing.contains(&FormField::ChildName));
        }
        other => panic!("unexpected rejection: {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status.state, SubmissionState::Idle);
    assert!(!snapshot.is_submitting);
}

#[tokio::test]
async fn rejected_photo_keeps_the_previous_one() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    let mut events = h.controller.subscribe_events();

    h.controller.attach_photo(small_photo("first.png")).await.unwrap();
    let too_big = PhotoFile::new("huge.png", "image/png", vec![0; MAX_PHOTO_BYTES as usize + 1]);
    let err = h.controller.attach_photo(too_big).await.unwrap_err();
    assert!(matches!(err, PhotoError::TooLarge { .. }));
    let not_image = PhotoFile::new("notes.txt", "text/plain", b"hi".to_vec());
    assert!(h.controller.attach_photo(not_image).await.is_err());

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.photo.map(|p| p.file_name).as_deref(), Some("first.png"));
    assert_eq!(snapshot.status.state, SubmissionState::Idle);

    let rejections: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ControllerEvent::PhotoRejected(message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(
        rejections,
        vec![
            "Photo size must be less than 5MB".to_string(),
            "Please select a valid image file".to_string(),
        ]
    );
}

#[tokio::test]
async fn photo_preview_is_derived_in_the_background() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    let mut events = h.controller.subscribe_events();

    h.controller.attach_photo(small_photo("kid.png")).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("preview in time")
        .expect("event");
    assert!(matches!(
        event,
        ControllerEvent::PhotoPreviewReady { ref file_name } if file_name == "kid.png"
    ));

    let photo = h.controller.snapshot().await.photo.expect("photo held");
    assert_eq!(
        photo.preview.as_deref(),
        Some("data:image/png;base64,cG5nLWJ5dGVz")
    );
    assert_eq!(photo.size_bytes, 9);
}

#[tokio::test]
async fn removed_photo_is_not_revived_by_a_late_preview() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    h.controller.attach_photo(small_photo("kid.png")).await.unwrap();
    h.controller.remove_photo().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.controller.snapshot().await.photo.is_none());
}

#[tokio::test]
async fn successful_submission_acknowledges_after_the_delay() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    let mut events = h.controller.subscribe_events();
    h.controller.open_form().await;
    fill_required(&h.controller).await;
    h.controller.attach_photo(small_photo("kid.png")).await.unwrap();

    let pending = h.controller.submit().await.expect("submit");
    let reference_id = pending.reference_id().clone();
    assert!(ReferenceId::parse("MVM", reference_id.as_str()).is_some());

    let outcome = pending.outcome().await;
    let SubmissionOutcome::Success { receipt, reply } = outcome else {
        panic!("expected success");
    };
    assert_eq!(receipt.reference_id, reference_id);
    assert_eq!(reply.message.as_deref(), Some("Enquiry received"));
    assert!(receipt
        .email_report()
        .render_html()
        .contains(reference_id.as_str()));

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status.state, SubmissionState::Success);
    assert_eq!(snapshot.status.progress, 100);
    assert_eq!(snapshot.view, EnquiryView::ThankYou);
    assert!(!snapshot.is_submitting);
    assert!(snapshot.photo.is_none());
    assert_eq!(snapshot.last_reference_id, Some(reference_id.clone()));

    let seen = h.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].reference_id, reference_id);
    assert_eq!(seen[0].field(FormField::ChildName), Some("RAHUL"));
    assert!(seen[0].photo.is_some());
    drop(seen);

    let events = drain(&mut events);
    assert!(!events.iter().any(|event| matches!(
        event,
        ControllerEvent::StatusChanged(status) if status.state == SubmissionState::Idle
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        ControllerEvent::Acknowledged { reference_id: acked } if *acked == reference_id
    )));
}

#[tokio::test]
async fn success_state_is_visible_before_acknowledgment() {
    let config = SubmissionConfig {
        ack_delay: Duration::from_millis(300),
        ..fast_config()
    };
    let h = harness(TestTransport::ok(), config).await;
    h.controller.open_form().await;
    fill_required(&h.controller).await;

    let _pending = h.controller.submit().await.expect("submit");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status.state, SubmissionState::Success);
    assert!(snapshot.is_submitting);
    assert_eq!(snapshot.view, EnquiryView::Form);
    assert_eq!(
        h.controller.submit().await.err(),
        Some(SubmitRejected::AlreadyUploading)
    );
}

#[tokio::test]
async fn server_rejection_shows_its_message_and_keeps_the_form() {
    let h = harness(
        TestTransport::failing(SubmissionError::Server {
            status: 422,
            message: Some("Contact number is invalid".into()),
        }),
        fast_config(),
    )
    .await;
    fill_required(&h.controller).await;

    let outcome = h.controller.submit().await.expect("submit").outcome().await;
    assert!(matches!(
        outcome,
        SubmissionOutcome::Failed {
            error: SubmissionError::Server { status: 422, .. },
            ..
        }
    ));

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status.state, SubmissionState::Error);
    assert_eq!(snapshot.status.progress, 0);
    assert_eq!(
        snapshot.status.error.as_deref(),
        Some("Contact number is invalid")
    );
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.form.get(FormField::ChildName), "RAHUL");
}

#[tokio::test]
async fn timeout_fails_with_the_network_message() {
    let config = SubmissionConfig {
        request_timeout: Duration::from_millis(100),
        ..fast_config()
    };
    let h = harness(TestTransport::hanging(), config).await;
    fill_required(&h.controller).await;

    let outcome = h.controller.submit().await.expect("submit").outcome().await;
    assert!(matches!(
        outcome,
        SubmissionOutcome::Failed {
            error: SubmissionError::Timeout(_),
            ..
        }
    ));

    let status = h.controller.snapshot().await.status;
    assert_eq!(status.state, SubmissionState::Error);
    assert_eq!(status.error.as_deref(), Some(NETWORK_FAILURE_MESSAGE));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.controller.snapshot().await.status, status);
}

#[tokio::test]
async fn cancel_returns_to_idle_and_drops_the_late_response() {
    let h = harness(
        TestTransport::scripted([Step::After(
            Duration::from_millis(150),
            ServerReply::default(),
        )]),
        fast_config(),
    )
    .await;
    let mut events = h.controller.subscribe_events();
    h.controller.open_form().await;
    fill_required(&h.controller).await;

    let pending = h.controller.submit().await.expect("submit");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(h.controller.cancel().await);
    assert!(!h.controller.cancel().await);
    assert!(matches!(pending.outcome().await, SubmissionOutcome::Cancelled));

    tokio::time::sleep(Duration::from_millis(250)).await;
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status.state, SubmissionState::Idle);
    assert_eq!(snapshot.status.progress, 0);
    assert_eq!(snapshot.view, EnquiryView::Form);
    assert!(!snapshot.is_submitting);
    assert!(snapshot.last_reference_id.is_none());

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, ControllerEvent::Cancelled)));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ControllerEvent::Acknowledged { .. })));
}

#[tokio::test]
async fn cancel_without_an_upload_is_a_no_op() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    assert!(!h.controller.cancel().await);
    assert_eq!(
        h.controller.snapshot().await.status.state,
        SubmissionState::Idle
    );
}

#[tokio::test]
async fn progress_ticks_up_to_the_cap_while_uploading() {
    let h = harness(TestTransport::hanging(), fast_config()).await;
    let mut events = h.controller.subscribe_events();
    fill_required(&h.controller).await;

    let _pending = h.controller.submit().await.expect("submit");
    tokio::time::sleep(Duration::from_millis(400)).await;

    let status = h.controller.snapshot().await.status;
    assert_eq!(status.state, SubmissionState::Uploading);
    assert_eq!(status.progress, 90);

    let ticks: Vec<u8> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ControllerEvent::Progress(value) => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);

    h.controller.cancel().await;
}

#[tokio::test]
async fn second_submit_while_uploading_is_rejected() {
    let h = harness(TestTransport::hanging(), fast_config()).await;
    fill_required(&h.controller).await;

    let _pending = h.controller.submit().await.expect("submit");
    let err = h.controller.submit().await.err().expect("rejected");
    assert_eq!(err, SubmitRejected::AlreadyUploading);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    h.controller.cancel().await;
}

#[tokio::test]
async fn retry_is_only_offered_after_a_failure() {
    let h = harness(
        TestTransport::scripted([
            Step::Fail(SubmissionError::Network("connection refused".into())),
            Step::Reply(ServerReply::default()),
        ]),
        fast_config(),
    )
    .await;
    fill_required(&h.controller).await;

    assert_eq!(
        h.controller.retry().await.err(),
        Some(SubmitRejected::NothingToRetry)
    );

    let first = h.controller.submit().await.expect("submit").outcome().await;
    assert!(matches!(first, SubmissionOutcome::Failed { .. }));
    assert_eq!(
        h.controller.snapshot().await.status.error.as_deref(),
        Some(NETWORK_FAILURE_MESSAGE)
    );

    let second = h.controller.retry().await.expect("retry").outcome().await;
    assert!(matches!(second, SubmissionOutcome::Success { .. }));
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.controller.retry().await.err(),
        Some(SubmitRejected::NothingToRetry)
    );
}

#[tokio::test]
async fn retry_with_emptied_required_field_keeps_the_error() {
    let h = harness(
        TestTransport::failing(SubmissionError::Network("reset".into())),
        fast_config(),
    )
    .await;
    fill_required(&h.controller).await;
    h.controller.submit().await.expect("submit").outcome().await;

    h.controller
        .update_field(FormField::HowKnow, "")
        .await
        .unwrap();
    let err = h.controller.retry().await.err().expect("rejected");
    assert_eq!(err, SubmitRejected::MissingRequired(vec![FormField::HowKnow]));
    assert_eq!(
        h.controller.snapshot().await.status.state,
        SubmissionState::Error
    );
}

#[tokio::test]
async fn clear_during_upload_aborts_and_resets_everything() {
    let h = harness(TestTransport::hanging(), fast_config()).await;
    h.controller.open_form().await;
    fill_required(&h.controller).await;
    h.controller.attach_photo(small_photo("kid.png")).await.unwrap();

    let pending = h.controller.submit().await.expect("submit");
    h.controller.clear().await;
    assert!(matches!(pending.outcome().await, SubmissionOutcome::Cancelled));

    tokio::time::sleep(Duration::from_millis(60)).await;
    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.form.is_empty());
    assert!(snapshot.photo.is_none());
    assert_eq!(snapshot.status, SubmissionStatus::idle());
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.view, EnquiryView::Teaser);
}

#[tokio::test]
async fn success_is_left_only_through_clear() {
    let h = harness(
        TestTransport::scripted([
            Step::Reply(ServerReply::default()),
            Step::Reply(ServerReply::default()),
        ]),
        fast_config(),
    )
    .await;
    h.controller.open_form().await;
    fill_required(&h.controller).await;

    let outcome = h.controller.submit().await.expect("submit").outcome().await;
    assert!(matches!(outcome, SubmissionOutcome::Success { .. }));
    assert!(!h.controller.snapshot().await.is_submitting);

    assert_eq!(
        h.controller.submit().await.err(),
        Some(SubmitRejected::AlreadySubmitted)
    );
    assert!(!h.controller.cancel().await);
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status.state, SubmissionState::Success);
    assert_eq!(snapshot.view, EnquiryView::ThankYou);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    h.controller.clear().await;
    fill_required(&h.controller).await;
    let outcome = h.controller.submit().await.expect("submit after clear").outcome().await;
    assert!(matches!(outcome, SubmissionOutcome::Success { .. }));
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_progress_tick_does_not_stop_the_upload() {
    let config = SubmissionConfig {
        progress_tick: Duration::ZERO,
        ..fast_config()
    };
    let h = harness(TestTransport::hanging(), config).await;
    fill_required(&h.controller).await;

    let _pending = h.controller.submit().await.expect("submit");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = h.controller.snapshot().await.status;
    assert_eq!(status.state, SubmissionState::Uploading);
    assert_eq!(status.progress, 90);
    assert!(h.controller.cancel().await);
}

#[tokio::test]
async fn clear_after_error_and_after_success_returns_to_idle() {
    let h = harness(
        TestTransport::scripted([
            Step::Fail(SubmissionError::Network("down".into())),
            Step::Reply(ServerReply::default()),
        ]),
        fast_config(),
    )
    .await;
    h.controller.open_form().await;

    fill_required(&h.controller).await;
    h.controller.submit().await.expect("submit").outcome().await;
    h.controller.clear().await;
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status, SubmissionStatus::idle());
    assert!(snapshot.form.is_empty());

    fill_required(&h.controller).await;
    h.controller.submit().await.expect("submit").outcome().await;
    assert_eq!(h.controller.snapshot().await.view, EnquiryView::ThankYou);
    h.controller.clear().await;
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status, SubmissionStatus::idle());
    assert_eq!(snapshot.view, EnquiryView::Teaser);
}

#[tokio::test]
async fn view_follows_teaser_form_and_close() {
    let h = harness(TestTransport::ok(), fast_config()).await;
    assert_eq!(h.controller.snapshot().await.view, EnquiryView::Closed);

    h.controller.open_teaser().await;
    assert_eq!(h.controller.snapshot().await.view, EnquiryView::Teaser);
    h.controller.open_form().await;
    assert_eq!(h.controller.snapshot().await.view, EnquiryView::Form);
    h.controller.open_teaser().await;
    assert_eq!(h.controller.snapshot().await.view, EnquiryView::Form);
    h.controller.close().await;
    assert_eq!(h.controller.snapshot().await.view, EnquiryView::Closed);
}

#[tokio::test]
async fn shutdown_aborts_and_refuses_new_submissions() {
    let h = harness(TestTransport::hanging(), fast_config()).await;
    fill_required(&h.controller).await;

    let pending = h.controller.submit().await.expect("submit");
    h.controller.shutdown().await;
    assert!(matches!(pending.outcome().await, SubmissionOutcome::Cancelled));
    assert_eq!(
        h.controller.submit().await.err(),
        Some(SubmitRejected::ShutDown)
    );
}

#[tokio::test]
async fn dropping_the_controller_aborts_the_request() {
    let h = harness(TestTransport::hanging(), fast_config()).await;
    fill_required(&h.controller).await;

    let pending = h.controller.submit().await.expect("submit");
    drop(h.controller);

    let outcome = tokio::time::timeout(Duration::from_secs(2), pending.outcome())
        .await
        .expect("aborted promptly");
    assert!(matches!(outcome, SubmissionOutcome::Cancelled));
}
