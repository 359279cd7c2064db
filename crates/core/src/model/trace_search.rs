use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub span_count: u64,
    #[serde(default)]
    pub error_count: Option<u64>,
}

/// Summary of one trace as returned by a trace search query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceSearchResult {
    pub trace_id: String,
    pub root_service_name: String,
    pub root_trace_name: String,
    pub start_time_unix_ms: f64,
    pub duration_ms: f64,
    #[serde(default)]
    pub service_stats: BTreeMap<String, ServiceStats>,
}

impl TraceSearchResult {
    pub fn span_count(&self) -> u64 {
        self.service_stats.values().map(|s| s.span_count).sum()
    }

    pub fn error_count(&self) -> u64 {
        self.service_stats
            .values()
            .map(|s| s.error_count.unwrap_or(0))
            .sum()
    }
}

/// Result of one trace search query together with the datasource it ran on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceSearchData {
    #[serde(default)]
    pub datasource_name: Option<String>,
    #[serde(default)]
    pub search_result: Option<Vec<TraceSearchResult>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_service_stats() {
        let raw = r#"{
            "traceId": "4bf92f3577b34da6a3ce929d0e0e4736",
            "rootServiceName": "api",
            "rootTraceName": "GET /orders",
            "startTimeUnixMs": 1700000000000,
            "durationMs": 120,
            "serviceStats": {
                "api": {"spanCount": 3, "errorCount": 1},
                "db": {"spanCount": 2}
            }
        }"#;
        let result: TraceSearchResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.span_count(), 5);
        assert_eq!(result.error_count(), 1);
    }
}
