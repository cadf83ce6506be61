use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::{AbortHandle, AbortRegistration, Abortable, Aborted};
use serde::Serialize;
use shared::{
    domain::{FormField, ReferenceId},
    error::FormError,
    protocol::ServerReply,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex, MutexGuard},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    form::EnquiryForm,
    payload::EnquiryPayload,
    photo::{PhotoError, PhotoFile},
    report::EmailReport,
    settings::SubmissionConfig,
    transport::{EnquiryTransport, SubmissionError},
};

pub const SUBMISSION_CANCELLED: &str = "Submission cancelled";
pub const THANK_YOU_MESSAGE: &str =
    "Thank you for your interest in our school. We will contact you soon!";

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MIN_PROGRESS_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Uploading,
    Success,
    Error,
}

/// Lifecycle state with its synthetic progress and the message shown on error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionStatus {
    pub state: SubmissionState,
    pub progress: u8,
    pub error: Option<String>,
}

impl SubmissionStatus {
    fn idle() -> Self {
        Self {
            state: SubmissionState::Idle,
            progress: 0,
            error: None,
        }
    }

    fn uploading() -> Self {
        Self {
            state: SubmissionState::Uploading,
            progress: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnquiryView {
    Closed,
    Teaser,
    Form,
    ThankYou,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSummary {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub preview: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub form: EnquiryForm,
    pub status: SubmissionStatus,
    pub photo: Option<PhotoSummary>,
    pub view: EnquiryView,
    pub is_submitting: bool,
    pub last_reference_id: Option<ReferenceId>,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StatusChanged(SubmissionStatus),
    Progress(u8),
    PhotoPreviewReady { file_name: String },
    PhotoRejected(String),
    Cancelled,
    Acknowledged { reference_id: ReferenceId },
    ViewChanged(EnquiryView),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("required fields are empty: {}", join_fields(.0))]
    MissingRequired(Vec<FormField>),
    #[error("a submission is already in progress")]
    AlreadyUploading,
    #[error("the enquiry was already submitted; clear the form to start another")]
    AlreadySubmitted,
    #[error("there is no failed submission to retry")]
    NothingToRetry,
    #[error("the enquiry controller has been shut down")]
    ShutDown,
}

fn join_fields(fields: &[FormField]) -> String {
    fields
        .iter()
        .map(|field| field.wire_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What was sent in one attempt, kept so the email report matches the payload.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub reference_id: ReferenceId,
    pub submitted_at: DateTime<Utc>,
    pub form: EnquiryForm,
    pub photo_preview: Option<String>,
}

impl SubmissionReceipt {
    pub fn email_report(&self) -> EmailReport<'_> {
        EmailReport {
            form: &self.form,
            photo_preview: self.photo_preview.as_deref(),
            reference_id: &self.reference_id,
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Success {
        receipt: SubmissionReceipt,
        reply: ServerReply,
    },
    Failed {
        reference_id: ReferenceId,
        error: SubmissionError,
    },
    /// Aborted by `cancel`, `clear` or teardown; no handler ran.
    Cancelled,
}

/// Handle to an attempt running in the background.
pub struct PendingSubmission {
    attempt: u64,
    reference_id: ReferenceId,
    task: JoinHandle<SubmissionOutcome>,
}

impl PendingSubmission {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn reference_id(&self) -> &ReferenceId {
        &self.reference_id
    }

    pub async fn outcome(self) -> SubmissionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(attempt = self.attempt, %err, "admission: submission task ended abnormally");
                SubmissionOutcome::Cancelled
            }
        }
    }
}

struct HeldPhoto {
    file: PhotoFile,
    preview: Option<String>,
    generation: u64,
}

/// Scope of the in-flight attempt. Completions carrying another id are stale.
struct AttemptScope {
    id: u64,
    abort: AbortHandle,
    ticker: JoinHandle<()>,
}

impl AttemptScope {
    fn stop(self) {
        self.abort.abort();
        self.ticker.abort();
    }
}

struct ControllerState {
    form: EnquiryForm,
    photo: Option<HeldPhoto>,
    status: SubmissionStatus,
    view: EnquiryView,
    is_submitting: bool,
    attempt: Option<AttemptScope>,
    next_attempt: u64,
    pending_ack: Option<u64>,
    photo_generation: u64,
    last_reference_id: Option<ReferenceId>,
    shut_down: bool,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            form: EnquiryForm::new(),
            photo: None,
            status: SubmissionStatus::idle(),
            view: EnquiryView::Closed,
            is_submitting: false,
            attempt: None,
            next_attempt: 1,
            pending_ack: None,
            photo_generation: 0,
            last_reference_id: None,
            shut_down: false,
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        !self.shut_down && self.attempt.as_ref().map(|scope| scope.id) == Some(attempt)
    }

    fn stop_attempt(&mut self) -> bool {
        match self.attempt.take() {
            Some(scope) => {
                scope.stop();
                true
            }
            None => false,
        }
    }
}

/// Drives one admission enquiry from field entry to a resolved outcome.
///
/// At most one request is in flight. Background work (photo preview, the
/// request, the progress ticker, the thank-you delay) holds only a weak
/// reference and applies its result only while its scope is still current,
/// so nothing lands after `cancel`, `clear`, `shutdown` or drop.
pub struct SubmissionController {
    transport: Arc<dyn EnquiryTransport>,
    config: SubmissionConfig,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl SubmissionController {
    pub fn new(transport: Arc<dyn EnquiryTransport>, config: SubmissionConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            transport,
            config,
            inner: Mutex::new(ControllerState::new()),
            events,
        })
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let guard = self.inner.lock().await;
        ControllerSnapshot {
            form: guard.form.clone(),
            status: guard.status.clone(),
            photo: guard.photo.as_ref().map(|held| PhotoSummary {
                file_name: held.file.file_name.clone(),
                mime_type: held.file.mime_type.clone(),
                size_bytes: held.file.size(),
                preview: held.preview.clone(),
            }),
            view: guard.view,
            is_submitting: guard.is_submitting,
            last_reference_id: guard.last_reference_id.clone(),
        }
    }

    pub async fn open_teaser(&self) {
        let mut guard = self.inner.lock().await;
        if guard.view == EnquiryView::Closed {
            self.set_view(&mut guard, EnquiryView::Teaser);
        }
    }

    /// Shows the enquiry form; callers that want the form open hold the
    /// controller and call this directly.
    pub async fn open_form(&self) {
        let mut guard = self.inner.lock().await;
        if guard.view != EnquiryView::ThankYou {
            self.set_view(&mut guard, EnquiryView::Form);
        }
    }

    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        self.set_view(&mut guard, EnquiryView::Closed);
    }

    fn set_view(&self, state: &mut ControllerState, view: EnquiryView) {
        if state.view != view {
            state.view = view;
            self.emit(ControllerEvent::ViewChanged(view));
        }
    }

    pub async fn update_field(&self, field: FormField, value: &str) -> Result<(), FormError> {
        self.inner.lock().await.form.set(field, value)
    }

    pub async fn update_field_by_name(&self, name: &str, value: &str) -> Result<FormField, FormError> {
        self.inner.lock().await.form.set_by_name(name, value)
    }

    /// Validates and holds `file`, then derives its preview in the background.
    /// A rejected file leaves the previously held photo untouched.
    pub async fn attach_photo(self: &Arc<Self>, file: PhotoFile) -> Result<(), PhotoError> {
        if let Err(err) = file.validate(self.config.max_photo_bytes) {
            warn!(file_name = %file.file_name, %err, "admission: photo rejected");
            self.emit(ControllerEvent::PhotoRejected(err.to_string()));
            return Err(err);
        }

        let generation = {
            let mut guard = self.inner.lock().await;
            guard.photo_generation += 1;
            let generation = guard.photo_generation;
            guard.photo = Some(HeldPhoto {
                file: file.clone(),
                preview: None,
                generation,
            });
            generation
        };
        debug!(file_name = %file.file_name, size = file.size(), "admission: photo attached");

        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let file_name = file.file_name.clone();
            let preview = match tokio::task::spawn_blocking(move || file.preview_data_url()).await
            {
                Ok(preview) => preview,
                Err(err) => {
                    warn!(%file_name, %err, "admission: photo preview failed");
                    return;
                }
            };

            let Some(controller) = controller.upgrade() else {
                return;
            };
            let mut guard = controller.inner.lock().await;
            if guard.shut_down {
                return;
            }
            match guard.photo.as_mut() {
                Some(held) if held.generation == generation => {
                    held.preview = Some(preview);
                    controller.emit(ControllerEvent::PhotoPreviewReady { file_name });
                }
                _ => debug!(%file_name, "admission: discarding stale photo preview"),
            }
        });

        Ok(())
    }

    pub async fn remove_photo(&self) {
        let mut guard = self.inner.lock().await;
        guard.photo_generation += 1;
        guard.photo = None;
    }

    pub async fn submit(self: &Arc<Self>) -> Result<PendingSubmission, SubmitRejected> {
        let guard = self.inner.lock().await;
        self.begin_attempt(guard)
    }

    /// Resubmits the currently held form after a failure.
    pub async fn retry(self: &Arc<Self>) -> Result<PendingSubmission, SubmitRejected> {
        let guard = self.inner.lock().await;
        if guard.status.state != SubmissionState::Error {
            return Err(SubmitRejected::NothingToRetry);
        }
        info!("admission: retrying enquiry");
        self.begin_attempt(guard)
    }

    fn begin_attempt(
        self: &Arc<Self>,
        mut guard: MutexGuard<'_, ControllerState>,
    ) -> Result<PendingSubmission, SubmitRejected> {
        if guard.shut_down {
            return Err(SubmitRejected::ShutDown);
        }
        if guard.is_submitting || guard.status.state == SubmissionState::Uploading {
            return Err(SubmitRejected::AlreadyUploading);
        }
        if guard.status.state == SubmissionState::Success {
            return Err(SubmitRejected::AlreadySubmitted);
        }
        let missing = guard.form.missing_required();
        if !missing.is_empty() {
            debug!(missing = %join_fields(&missing), "admission: submit blocked by empty required fields");
            return Err(SubmitRejected::MissingRequired(missing));
        }

        let submitted_at = Utc::now();
        let reference_id = ReferenceId::generate(&self.config.reference_prefix, submitted_at);
        let photo = guard.photo.as_ref();
        let payload = EnquiryPayload::build(
            &guard.form,
            photo.map(|held| &held.file),
            reference_id.clone(),
            submitted_at,
        );
        let receipt = SubmissionReceipt {
            reference_id: reference_id.clone(),
            submitted_at,
            form: guard.form.clone(),
            photo_preview: photo.and_then(|held| held.preview.clone()),
        };

        let attempt = guard.next_attempt;
        guard.next_attempt += 1;
        let (abort, registration) = AbortHandle::new_pair();
        let ticker = self.spawn_progress_ticker(attempt);
        guard.attempt = Some(AttemptScope {
            id: attempt,
            abort,
            ticker,
        });
        guard.pending_ack = None;
        guard.is_submitting = true;
        guard.status = SubmissionStatus::uploading();
        self.emit(ControllerEvent::StatusChanged(guard.status.clone()));
        drop(guard);

        info!(
            attempt,
            %reference_id,
            fields = payload.fields.len(),
            has_photo = payload.photo.is_some(),
            "admission: submitting enquiry"
        );

        let task = tokio::spawn(Self::run_attempt(
            Arc::downgrade(self),
            Arc::clone(&self.transport),
            self.config.clone(),
            attempt,
            payload,
            receipt,
            registration,
        ));

        Ok(PendingSubmission {
            attempt,
            reference_id,
            task,
        })
    }

    fn spawn_progress_ticker(self: &Arc<Self>, attempt: u64) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        let tick = self.config.progress_tick.max(MIN_PROGRESS_TICK);
        let step = self.config.progress_step;
        let cap = self.config.progress_cap;

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick, tick);
            loop {
                interval.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let mut guard = controller.inner.lock().await;
                if !guard.is_current(attempt) {
                    break;
                }
                let next = guard.status.progress.saturating_add(step).min(cap);
                if next != guard.status.progress {
                    guard.status.progress = next;
                    controller.emit(ControllerEvent::Progress(next));
                }
            }
        })
    }

    async fn run_attempt(
        weak: Weak<Self>,
        transport: Arc<dyn EnquiryTransport>,
        config: SubmissionConfig,
        attempt: u64,
        payload: EnquiryPayload,
        receipt: SubmissionReceipt,
        registration: AbortRegistration,
    ) -> SubmissionOutcome {
        let request = time::timeout(config.request_timeout, transport.send(payload));
        let result = match Abortable::new(request, registration).await {
            Err(Aborted) => {
                debug!(attempt, "admission: request aborted");
                return SubmissionOutcome::Cancelled;
            }
            Ok(Err(_elapsed)) => Err(SubmissionError::Timeout(config.request_timeout)),
            Ok(Ok(result)) => result,
        };

        let Some(controller) = weak.upgrade() else {
            return SubmissionOutcome::Cancelled;
        };
        let mut guard = controller.inner.lock().await;
        if !guard.is_current(attempt) {
            debug!(attempt, "admission: dropping stale response");
            return SubmissionOutcome::Cancelled;
        }
        guard.stop_attempt();

        match result {
            Ok(reply) => {
                guard.status = SubmissionStatus {
                    state: SubmissionState::Success,
                    progress: 100,
                    error: None,
                };
                guard.last_reference_id = Some(receipt.reference_id.clone());
                guard.pending_ack = Some(attempt);
                controller.emit(ControllerEvent::StatusChanged(guard.status.clone()));
                drop(guard);
                drop(controller);
                info!(attempt, reference_id = %receipt.reference_id, "admission: enquiry accepted");

                time::sleep(config.ack_delay).await;
                if let Some(controller) = weak.upgrade() {
                    controller.acknowledge(attempt, &receipt.reference_id).await;
                }

                SubmissionOutcome::Success { receipt, reply }
            }
            Err(error) => {
                let message = error.user_message();
                warn!(attempt, reference_id = %receipt.reference_id, %error, "admission: enquiry failed");
                guard.status = SubmissionStatus {
                    state: SubmissionState::Error,
                    progress: 0,
                    error: Some(message),
                };
                guard.is_submitting = false;
                controller.emit(ControllerEvent::StatusChanged(guard.status.clone()));

                SubmissionOutcome::Failed {
                    reference_id: receipt.reference_id,
                    error,
                }
            }
        }
    }

    async fn acknowledge(&self, attempt: u64, reference_id: &ReferenceId) {
        let mut guard = self.inner.lock().await;
        if guard.shut_down || guard.pending_ack != Some(attempt) {
            return;
        }
        guard.pending_ack = None;
        guard.is_submitting = false;
        guard.photo_generation += 1;
        guard.photo = None;
        self.set_view(&mut guard, EnquiryView::ThankYou);
        self.emit(ControllerEvent::Acknowledged {
            reference_id: reference_id.clone(),
        });
    }

    /// Aborts the in-flight request, if any. Returns whether one was aborted.
    pub async fn cancel(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let Some(attempt) = guard.attempt.as_ref().map(|scope| scope.id) else {
            return false;
        };
        guard.stop_attempt();
        guard.is_submitting = false;
        guard.status = SubmissionStatus::idle();
        self.emit(ControllerEvent::StatusChanged(guard.status.clone()));
        self.emit(ControllerEvent::Cancelled);
        info!(attempt, "admission: submission cancelled");
        true
    }

    /// Back to an empty form with no photo and an idle lifecycle.
    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        if guard.stop_attempt() {
            debug!("admission: clear aborted the in-flight request");
        }
        guard.form.clear();
        guard.photo_generation += 1;
        guard.photo = None;
        guard.pending_ack = None;
        guard.is_submitting = false;
        guard.status = SubmissionStatus::idle();
        self.emit(ControllerEvent::StatusChanged(guard.status.clone()));
        if guard.view != EnquiryView::Closed {
            self.set_view(&mut guard, EnquiryView::Teaser);
        }
    }

    /// Teardown. Everything still running becomes a no-op.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        guard.shut_down = true;
        guard.stop_attempt();
        guard.pending_ack = None;
        guard.photo_generation += 1;
        debug!("admission: controller shut down");
    }
}

impl Drop for SubmissionController {
    fn drop(&mut self) {
        let state = self.inner.get_mut();
        state.shut_down = true;
        state.stop_attempt();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
