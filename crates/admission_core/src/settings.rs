use std::{collections::HashMap, fs, path::Path, time::Duration};

use shared::{domain::DEFAULT_REFERENCE_PREFIX, protocol::ADMISSION_PATH};
use url::Url;

use crate::photo::MAX_PHOTO_BYTES;

pub const SETTINGS_FILE: &str = "admission.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Production,
    Local,
}

impl Deployment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "local" | "development" | "dev" => Some(Self::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub deployment: Deployment,
    pub production_base_url: String,
    pub local_base_url: String,
    pub reference_prefix: String,
    pub request_timeout_secs: u64,
    pub progress_tick_ms: u64,
    pub ack_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deployment: Deployment::Production,
            production_base_url: "https://minerva-backed-3.onrender.com".into(),
            local_base_url: "http://127.0.0.1:5000".into(),
            reference_prefix: DEFAULT_REFERENCE_PREFIX.into(),
            request_timeout_secs: 30,
            progress_tick_ms: 500,
            ack_delay_ms: 1000,
        }
    }
}

impl Settings {
    pub fn base_url(&self) -> &str {
        match self.deployment {
            Deployment::Production => &self.production_base_url,
            Deployment::Local => &self.local_base_url,
        }
    }

    pub fn endpoint(&self) -> Result<Url, url::ParseError> {
        admission_endpoint(self.base_url())
    }

    pub fn submission_config(&self) -> SubmissionConfig {
        SubmissionConfig {
            reference_prefix: self.reference_prefix.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            progress_tick: Duration::from_millis(self.progress_tick_ms),
            ack_delay: Duration::from_millis(self.ack_delay_ms),
            ..SubmissionConfig::default()
        }
    }
}

/// Runtime knobs of the submission controller.
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    pub reference_prefix: String,
    pub request_timeout: Duration,
    pub progress_tick: Duration,
    pub progress_step: u8,
    pub progress_cap: u8,
    pub ack_delay: Duration,
    pub max_photo_bytes: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            reference_prefix: DEFAULT_REFERENCE_PREFIX.into(),
            request_timeout: Duration::from_secs(30),
            progress_tick: Duration::from_millis(500),
            progress_step: 10,
            progress_cap: 90,
            ack_delay: Duration::from_secs(1),
            max_photo_bytes: MAX_PHOTO_BYTES,
        }
    }
}

/// `<base>/api/admission`, keeping any path prefix of the base URL.
pub fn admission_endpoint(base_url: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base_url.trim())?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(ADMISSION_PATH)
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the flat `key = value` table in `path`, then environment
/// overrides looked up through `env`. A missing or malformed file is skipped.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(table) = toml::from_str::<toml::Table>(&raw) {
            let file_cfg: HashMap<String, String> = table
                .into_iter()
                .map(|(key, value)| match value {
                    toml::Value::String(text) => (key, text),
                    other => (key, other.to_string()),
                })
                .collect();
            apply(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    apply(&mut settings, |key| env(&format!("APP__{}", key.to_ascii_uppercase())));
    if let Some(deployment) = env("ADMISSION_ENV").as_deref().and_then(Deployment::parse) {
        settings.deployment = deployment;
    }

    settings
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("deployment").as_deref().and_then(Deployment::parse) {
        settings.deployment = v;
    }
    if let Some(v) = lookup("production_base_url") {
        settings.production_base_url = v;
    }
    if let Some(v) = lookup("local_base_url") {
        settings.local_base_url = v;
    }
    if let Some(v) = lookup("reference_prefix") {
        settings.reference_prefix = v;
    }
    if let Some(v) = lookup("request_timeout_secs").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = lookup("progress_tick_ms")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
    {
        settings.progress_tick_ms = v;
    }
    if let Some(v) = lookup("ack_delay_ms").and_then(|v| v.parse().ok()) {
        settings.ack_delay_ms = v;
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
