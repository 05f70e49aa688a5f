use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monitor settings. Fixed once the monitor is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Destination origins every envelope is posted to, in order.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_collection_entries")]
    pub max_collection_entries: usize,
    #[serde(default = "default_function_source_length")]
    pub function_source_length: usize,
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    #[serde(default = "default_initial_check_delay_ms")]
    pub initial_check_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_budget")]
    pub poll_budget: u32,
    /// Id of the `div` whose emptiness marks a blank screen in error reports.
    #[serde(default = "default_blank_screen_root_id")]
    pub blank_screen_root_id: String,
    /// Attributes a UI framework leaves on rendered markup.
    #[serde(default = "default_framework_markers")]
    pub framework_markers: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            debounce_ms: default_debounce_ms(),
            max_string_length: default_max_string_length(),
            max_depth: default_max_depth(),
            max_collection_entries: default_max_collection_entries(),
            function_source_length: default_function_source_length(),
            dedup_window_ms: default_dedup_window_ms(),
            initial_check_delay_ms: default_initial_check_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_budget: default_poll_budget(),
            blank_screen_root_id: default_blank_screen_root_id(),
            framework_markers: default_framework_markers(),
        }
    }
}

impl MonitorConfig {
    /// Default settings posting to a single origin.
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            allowed_origins: vec![origin.into()],
            ..Default::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn initial_check_delay(&self) -> Duration {
        Duration::from_millis(self.initial_check_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://app.shipper.now/".to_string(),
        "https://app.shipper.app".to_string(),
    ]
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_max_string_length() -> usize {
    10_000
}

fn default_max_depth() -> usize {
    5
}

fn default_max_collection_entries() -> usize {
    100
}

fn default_function_source_length() -> usize {
    100
}

fn default_dedup_window_ms() -> u64 {
    5000
}

fn default_initial_check_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_poll_budget() -> u32 {
    20
}

fn default_blank_screen_root_id() -> String {
    "root".to_string()
}

fn default_framework_markers() -> Vec<String> {
    vec!["data-reactroot".to_string(), "data-react-helmet".to_string()]
}
