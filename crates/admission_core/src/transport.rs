use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::ACCEPT,
    multipart::{Form, Part},
    Client,
};
use shared::protocol::{ServerReply, PHOTO_PART};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::payload::EnquiryPayload;

pub const SERVER_FAILURE_MESSAGE: &str = "Failed to submit form. Please try again.";
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Failed to submit form. Please try again or contact us directly.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server rejected the enquiry with status {status}")]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("failed to encode enquiry payload: {0}")]
    Encoding(String),
}

impl SubmissionError {
    /// Text shown in the error state. Timeouts read exactly like network errors.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Server {
                message: Some(message),
                ..
            } => message.clone(),
            SubmissionError::Server { message: None, .. } | SubmissionError::Encoding(_) => {
                SERVER_FAILURE_MESSAGE.to_string()
            }
            SubmissionError::Network(_) | SubmissionError::Timeout(_) => {
                NETWORK_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

#[async_trait]
pub trait EnquiryTransport: Send + Sync {
    /// Sends one enquiry. A 2xx answer is `Ok`, everything else an error.
    async fn send(&self, payload: EnquiryPayload) -> Result<ServerReply, SubmissionError>;
}

/// Posts enquiries as `multipart/form-data` to the admission endpoint.
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(http: Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn multipart(payload: EnquiryPayload) -> Result<Form, SubmissionError> {
        let mut form = Form::new();
        for (name, value) in payload.text_parts() {
            form = form.text(name, value);
        }

        if let Some(photo) = payload.photo {
            let part = Part::bytes(photo.bytes)
                .file_name(photo.file_name)
                .mime_str(&photo.mime_type)
                .map_err(|e| SubmissionError::Encoding(e.to_string()))?;
            form = form.part(PHOTO_PART, part);
        }

        Ok(form)
    }
}

#[async_trait]
impl EnquiryTransport for HttpTransport {
    async fn send(&self, payload: EnquiryPayload) -> Result<ServerReply, SubmissionError> {
        let reference_id = payload.reference_id.clone();
        let form = Self::multipart(payload)?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;
        let reply = ServerReply::from_body(&body);
        debug!(%reference_id, status = status.as_u16(), "admission: endpoint replied");

        if status.is_success() {
            Ok(reply)
        } else {
            Err(SubmissionError::Server {
                status: status.as_u16(),
                message: reply.user_message().map(str::to_string),
            })
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
