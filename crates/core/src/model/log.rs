use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One log line as returned by a log query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Unix seconds, fractional part carries sub-second precision.
    pub timestamp: f64,
    pub line: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogsData {
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}
