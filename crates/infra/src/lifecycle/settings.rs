//! Data-only lifecycle settings, loadable from JSON and the environment.
//!
//! These cover the plain values of a [`LifecycleConfig`](super::LifecycleConfig);
//! closures (work methods, queue selectors, notifiers) are always set in code.

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_QUEUE: &str = "stint";
pub const DEFAULT_DURATION_FIELD: &str = "stint_duration";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Plain lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Run `background_process` through the worker gateway by default.
    pub background_processing: bool,
    /// Create a progress meter for each execution.
    pub progress_meter: bool,
    pub queue: String,
    /// Field accumulating execution time; `None` disables duration accounting.
    pub duration_field: Option<String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            background_processing: false,
            progress_meter: true,
            queue: DEFAULT_QUEUE.to_string(),
            duration_field: Some(DEFAULT_DURATION_FIELD.to_string()),
        }
    }
}

impl LifecycleSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overlaid with `STINT_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from a variable lookup.
    ///
    /// `STINT_ENV=production|staging` turns background processing on unless
    /// `STINT_BACKGROUND_PROCESSING` says otherwise. An empty
    /// `STINT_DURATION_FIELD` disables duration accounting.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("STINT_ENV") {
            if matches!(env.as_str(), "production" | "staging") {
                self.background_processing = true;
            }
        }
        if let Some(value) = lookup("STINT_BACKGROUND_PROCESSING") {
            self.background_processing = parse_bool("STINT_BACKGROUND_PROCESSING", value)?;
        }
        if let Some(value) = lookup("STINT_PROGRESS_METER") {
            self.progress_meter = parse_bool("STINT_PROGRESS_METER", value)?;
        }
        if let Some(queue) = lookup("STINT_QUEUE") {
            if queue.trim().is_empty() {
                return Err(SettingsError::InvalidValue {
                    key: "STINT_QUEUE",
                    value: queue,
                });
            }
            self.queue = queue;
        }
        if let Some(field) = lookup("STINT_DURATION_FIELD") {
            self.duration_field = if field.is_empty() { None } else { Some(field) };
        }
        Ok(self)
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue { key, value }),
    }
}
