use std::collections::{BTreeMap, BTreeSet};

use chrono::SecondsFormat;
use otpanel_core::filter::{LabelFilter, Severity, SortOrder, TimeWindow};
use otpanel_core::model::log::{LogEntry, LogsData};
use otpanel_core::time::ms_to_datetime;
use otpanel_core::{PanelError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

const SEVERITY_LABELS: [&str; 3] = ["level", "severity", "detected_level"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogsTableOptions {
    pub show_time: bool,
    pub allow_wrap: bool,
    pub enable_details: bool,
}

impl Default for LogsTableOptions {
    fn default() -> Self {
        Self {
            show_time: true,
            allow_wrap: false,
            enable_details: true,
        }
    }
}

/// Row selection applied before display.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub filters: Vec<LabelFilter>,
    pub line: Option<Regex>,
    pub window: TimeWindow,
    pub order: SortOrder,
}

impl LogQuery {
    pub fn with_line_pattern(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| PanelError::InvalidArgument(format!("invalid line pattern: {e}")))?;
        self.line = Some(re);
        Ok(self)
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        let labels_ok = self.filters.iter().all(|f| {
            entry
                .labels
                .get(&f.key)
                .is_some_and(|value| f.matches(value))
        });
        let line_ok = self.line.as_ref().is_none_or(|re| re.is_match(&entry.line));
        let time_ok = match (&self.window.since, &self.window.until) {
            (None, None) => true,
            _ => ms_to_datetime(entry.timestamp * 1000.0).is_some_and(|ts| self.window.contains(ts)),
        };
        labels_ok && line_ok && time_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRow {
    pub index: usize,
    /// RFC 3339 with milliseconds; absent when the panel hides time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub timestamp: f64,
    pub line: String,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsTableModel {
    pub rows: Vec<LogRow>,
    /// Sum of the totals reported by each query, when every query reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    pub options: LogsTableOptions,
}

pub fn detect_severity(labels: &BTreeMap<String, String>) -> Option<Severity> {
    SEVERITY_LABELS
        .iter()
        .filter_map(|key| labels.get(*key))
        .find_map(|value| value.parse().ok())
}

pub fn build_logs_table(results: &[LogsData], query: &LogQuery, options: LogsTableOptions) -> LogsTableModel {
    let total_count = results
        .iter()
        .map(|r| r.total_count)
        .sum::<Option<usize>>();

    let mut entries: Vec<&LogEntry> = results
        .iter()
        .flat_map(|r| r.entries.iter())
        .filter(|entry| {
            if !entry.timestamp.is_finite() {
                warn!(line = %entry.line, "dropping log entry with invalid timestamp");
                return false;
            }
            query.matches(entry)
        })
        .collect();

    entries.sort_by(|a, b| match query.order {
        SortOrder::Asc => a.timestamp.total_cmp(&b.timestamp),
        SortOrder::Desc => b.timestamp.total_cmp(&a.timestamp),
    });

    let rows = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| LogRow {
            index,
            time: options
                .show_time
                .then(|| ms_to_datetime(entry.timestamp * 1000.0))
                .flatten()
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            timestamp: entry.timestamp,
            line: entry.line.clone(),
            labels: entry.labels.clone(),
            severity: detect_severity(&entry.labels),
        })
        .collect();

    LogsTableModel {
        rows,
        total_count,
        options,
    }
}

/// Rows the user has expanded to see their labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedRows {
    enabled: bool,
    rows: BTreeSet<usize>,
}

impl ExpandedRows {
    pub fn new(options: &LogsTableOptions) -> Self {
        Self {
            enabled: options.enable_details,
            rows: BTreeSet::new(),
        }
    }

    /// Returns whether the row is expanded afterwards. A no-op when details
    /// are disabled.
    pub fn toggle(&mut self, index: usize) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.rows.remove(&index) {
            self.rows.insert(index);
        }
        self.is_expanded(index)
    }

    pub fn is_expanded(&self, index: usize) -> bool {
        self.rows.contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn detects_severity_from_known_labels() {
        let labels = |k: &str, v: &str| BTreeMap::from([(k.to_string(), v.to_string())]);
        assert_eq!(detect_severity(&labels("level", "warn")), Some(Severity::Warn));
        assert_eq!(detect_severity(&labels("severity", "ERROR")), Some(Severity::Error));
        assert_eq!(detect_severity(&labels("detected_level", "info")), Some(Severity::Info));
        assert_eq!(detect_severity(&labels("lvl", "info")), None);
        assert_eq!(detect_severity(&labels("level", "loud")), None);
    }

    #[test]
    fn rows_are_newest_first_by_default() {
        let model = build_logs_table(&testkit::sample_logs(), &LogQuery::default(), LogsTableOptions::default());
        assert_eq!(model.rows.len(), 3);
        assert_eq!(model.rows[0].line, "context deadline exceeded");
        assert_eq!(model.rows[0].severity, Some(Severity::Error));
        assert_eq!(model.rows[0].time.as_deref(), Some("2026-02-01T00:00:01.200Z"));
        assert_eq!(model.rows[2].index, 2);
        assert_eq!(model.total_count, Some(3));
    }

    #[test]
    fn filters_by_label_line_and_window() {
        let query = LogQuery {
            filters: vec![LabelFilter::parse("peer=redis:*").unwrap()],
            order: SortOrder::Asc,
            ..Default::default()
        };
        let model = build_logs_table(&testkit::sample_logs(), &query, LogsTableOptions::default());
        assert_eq!(model.rows.len(), 2);
        assert_eq!(model.rows[0].line, "retrying attempt=2");

        let query = LogQuery::default().with_line_pattern("^GET").unwrap();
        let model = build_logs_table(&testkit::sample_logs(), &query, LogsTableOptions::default());
        assert_eq!(model.rows.len(), 1);

        let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let query = LogQuery {
            window: TimeWindow {
                since: Some(base + Duration::milliseconds(500)),
                until: Some(base + Duration::milliseconds(1000)),
            },
            ..Default::default()
        };
        let model = build_logs_table(&testkit::sample_logs(), &query, LogsTableOptions::default());
        assert_eq!(model.rows.len(), 1);
        assert_eq!(model.rows[0].line, "retrying attempt=2");
    }

    #[test]
    fn bad_line_pattern_is_rejected() {
        assert!(LogQuery::default().with_line_pattern("(").is_err());
    }

    #[test]
    fn hidden_time_omits_column() {
        let options = LogsTableOptions {
            show_time: false,
            ..Default::default()
        };
        let model = build_logs_table(&testkit::sample_logs(), &LogQuery::default(), options);
        assert!(model.rows.iter().all(|r| r.time.is_none()));
    }

    #[test]
    fn expansion_respects_details_flag() {
        let mut expanded = ExpandedRows::new(&LogsTableOptions::default());
        assert!(expanded.toggle(3));
        assert!(expanded.is_expanded(3));
        assert!(!expanded.toggle(3));

        let mut disabled = ExpandedRows::new(&LogsTableOptions {
            enable_details: false,
            ..Default::default()
        });
        assert!(!disabled.toggle(1));
        assert!(!disabled.is_expanded(1));
    }
}
