//! Admission enquiry client: form state, photo handling, the multipart
//! submission lifecycle and the HTML email report.

pub mod controller;
pub mod form;
pub mod payload;
pub mod photo;
pub mod report;
pub mod settings;
pub mod transport;

pub use controller::{
    ControllerEvent, ControllerSnapshot, EnquiryView, PendingSubmission, PhotoSummary,
    SubmissionController, SubmissionOutcome, SubmissionReceipt, SubmissionState,
    SubmissionStatus, SubmitRejected,
};
pub use form::EnquiryForm;
pub use payload::EnquiryPayload;
pub use photo::{PhotoError, PhotoFile, MAX_PHOTO_BYTES};
pub use report::EmailReport;
pub use settings::{load_settings, Deployment, Settings, SubmissionConfig};
pub use transport::{EnquiryTransport, HttpTransport, SubmissionError};
