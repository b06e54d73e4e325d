//! Failure model: application faults, the persisted error detail, and
//! field-keyed validation failures.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Placeholder stored when the failure status itself could not be persisted.
pub const PERSISTENCE_FAILURE: &str = "Persistance Failure: See Logs";

/// Fault kind recorded for a work method that panicked.
pub const PANIC_KIND: &str = "panic";

/// A failure raised by application work.
///
/// `Fault` deliberately does not implement `std::error::Error` so that any
/// error type converts into it with `?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    kind: String,
    message: String,
    backtrace: Vec<String>,
}

impl Fault {
    /// Build a fault and capture the current backtrace.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            backtrace: capture_backtrace(),
        }
    }

    /// A fault with a generic kind.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new("Error", format!("{err:#}"))
    }

    /// Convert a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "work method panicked".to_string()
        };
        Self::new(PANIC_KIND, message)
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backtrace(&self) -> &[String] {
        &self.backtrace
    }
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for Fault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn capture_backtrace() -> Vec<String> {
    std::backtrace::Backtrace::force_capture()
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Field-keyed validation failures collected by application code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Structured failure information persisted on a record.
///
/// Either `{error, message, backtrace}` for a fault, `{<field>: [messages]}`
/// for validation failures, or `{error: PERSISTENCE_FAILURE}` after a fallback write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorDetail(BTreeMap<String, JsonValue>);

impl ErrorDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fault(fault: &Fault) -> Self {
        let mut map = BTreeMap::new();
        map.insert("error".to_string(), JsonValue::from(fault.kind()));
        map.insert("message".to_string(), JsonValue::from(fault.message()));
        map.insert(
            "backtrace".to_string(),
            JsonValue::from(fault.backtrace().to_vec()),
        );
        Self(map)
    }

    pub fn from_validation(errors: &ValidationErrors) -> Self {
        let map = errors
            .iter()
            .map(|(field, messages)| (field.to_string(), JsonValue::from(messages.to_vec())))
            .collect();
        Self(map)
    }

    pub fn persistence_failure() -> Self {
        let mut map = BTreeMap::new();
        map.insert("error".to_string(), JsonValue::from(PERSISTENCE_FAILURE));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// The `error` entry, if it is a string.
    pub fn error(&self) -> Option<&str> {
        self.get("error").and_then(JsonValue::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.get("message").and_then(JsonValue::as_str)
    }

    pub fn backtrace(&self) -> Vec<String> {
        self.strings("backtrace")
    }

    /// String list stored under `key` (validation messages, backtrace lines).
    pub fn strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.0.clone().into_iter().collect())
    }
}

impl core::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
