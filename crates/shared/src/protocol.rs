use serde::{Deserialize, Serialize};

/// Path of the admission endpoint, relative to the deployment base URL.
pub const ADMISSION_PATH: &str = "api/admission";

pub const PHOTO_PART: &str = "photo";
pub const SUBMITTED_AT_PART: &str = "submitted_at";
pub const REFERENCE_ID_PART: &str = "reference_id";

/// JSON body returned by the admission endpoint, on success and on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerReply {
    /// Parses a response body, treating anything that is not a JSON object as empty.
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// The human-readable text to show, `error` taking precedence over `message`.
    pub fn user_message(&self) -> Option<&str> {
        [self.error.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|text| !text.is_empty())
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
