use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of events relayed to the parent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    MonitorInitialized,
    RuntimeError,
    UnhandledPromiseRejection,
    NetworkRequest,
    ConsoleOutput,
    UrlChanged,
    ContentLoaded,
    BlankScreenDetected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MonitorInitialized => "MONITOR_INITIALIZED",
            EventKind::RuntimeError => "RUNTIME_ERROR",
            EventKind::UnhandledPromiseRejection => "UNHANDLED_PROMISE_REJECTION",
            EventKind::NetworkRequest => "NETWORK_REQUEST",
            EventKind::ConsoleOutput => "CONSOLE_OUTPUT",
            EventKind::UrlChanged => "URL_CHANGED",
            EventKind::ContentLoaded => "CONTENT_LOADED",
            EventKind::BlankScreenDetected => "BLANK_SCREEN_DETECTED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform `{type, data, timestamp}` message posted to each destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: serde_json::Value,
    pub timestamp: String,
}

impl Envelope {
    pub fn new(kind: EventKind, data: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            data,
            timestamp: iso_timestamp(at),
        }
    }
}

/// Formats an instant as `2024-01-01T00:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeErrorData {
    pub message: String,
    pub filename: String,
    pub lineno: u32,
    pub colno: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub blank_screen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionData {
    pub message: String,
    pub stack: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkErrorData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Milliseconds between issuing the request and its outcome.
    pub duration: i64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NetworkErrorData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleRecord {
    pub level: ConsoleSeverity,
    pub message: String,
    pub logged_at: String,
    pub raw: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleOutputData {
    pub messages: Vec<ConsoleRecord>,
}

/// Snapshot of the readiness signals for the page's main content area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentState {
    pub has_content: bool,
    pub root_element_exists: bool,
    pub root_has_children: bool,
    pub hmr_complete: bool,
    pub react_ready: bool,
}
