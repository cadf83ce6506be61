use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::{domain::FormField, error::FormError};

/// Field values of one admission enquiry. Absent keys are empty fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnquiryForm {
    values: BTreeMap<FormField, String>,
}

impl EnquiryForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` the way the form input would: upper-cased for every
    /// field except the date of birth, and restricted to the option set of
    /// select fields. An empty value resets the field.
    pub fn set(&mut self, field: FormField, value: &str) -> Result<(), FormError> {
        let value = if field.is_upper_cased() {
            value.to_uppercase()
        } else {
            value.to_string()
        };

        if value.is_empty() {
            self.values.remove(&field);
            return Ok(());
        }

        if let Some(options) = field.options() {
            if !options.contains(&value.as_str()) {
                return Err(FormError::InvalidOption { field, value });
            }
        }

        self.values.insert(field, value);
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: &str) -> Result<FormField, FormError> {
        let field: FormField = name.parse()?;
        self.set(field, value)?;
        Ok(field)
    }

    pub fn get(&self, field: FormField) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or_default()
    }

    /// Required fields that are still empty, in form order.
    pub fn missing_required(&self) -> Vec<FormField> {
        FormField::required()
            .filter(|field| self.get(*field).is_empty())
            .collect()
    }

    /// Non-empty fields in form order; empty fields are never serialized.
    pub fn filled(&self) -> impl Iterator<Item = (FormField, &str)> {
        self.values
            .iter()
            .map(|(field, value)| (*field, value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
