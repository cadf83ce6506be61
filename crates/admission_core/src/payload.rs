use chrono::{DateTime, SecondsFormat, Utc};
use shared::{
    domain::{FormField, ReferenceId},
    protocol::{REFERENCE_ID_PART, SUBMITTED_AT_PART},
};

use crate::{form::EnquiryForm, photo::PhotoFile};

/// Everything one submission attempt transmits.
#[derive(Debug, Clone)]
pub struct EnquiryPayload {
    pub fields: Vec<(FormField, String)>,
    pub photo: Option<PhotoFile>,
    pub submitted_at: DateTime<Utc>,
    pub reference_id: ReferenceId,
}

impl EnquiryPayload {
    pub fn build(
        form: &EnquiryForm,
        photo: Option<&PhotoFile>,
        reference_id: ReferenceId,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fields: form
                .filled()
                .map(|(field, value)| (field, value.to_string()))
                .collect(),
            photo: photo.cloned(),
            submitted_at,
            reference_id,
        }
    }

    pub fn field(&self, field: FormField) -> Option<&str> {
        self.fields
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .map(|(_, value)| value.as_str())
    }

    /// ISO-8601 with millisecond precision and a `Z` suffix.
    pub fn submitted_at_iso(&self) -> String {
        self.submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Text parts of the multipart body in transmission order; the photo
    /// travels as a separate file part.
    pub fn text_parts(&self) -> Vec<(&'static str, String)> {
        self.fields
            .iter()
            .map(|(field, value)| (field.wire_name(), value.clone()))
            .chain([
                (SUBMITTED_AT_PART, self.submitted_at_iso()),
                (REFERENCE_ID_PART, self.reference_id.to_string()),
            ])
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/payload_tests.rs"]
mod tests;
