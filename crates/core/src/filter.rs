use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// OTLP severity buckets, named after their lowest severity number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace = 1,
    Debug = 5,
    Info = 9,
    Warn = 13,
    Error = 17,
    Fatal = 21,
}

impl Severity {
    pub fn from_number(level: i32) -> Option<Self> {
        match level {
            1..=4 => Some(Self::Trace),
            5..=8 => Some(Self::Debug),
            9..=12 => Some(Self::Info),
            13..=16 => Some(Self::Warn),
            17..=20 => Some(Self::Error),
            21..=24 => Some(Self::Fatal),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" | "DBG" => Ok(Self::Debug),
            "INFO" | "INFORMATION" | "NOTICE" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" | "ERR" => Ok(Self::Error),
            "FATAL" | "CRITICAL" | "CRIT" | "PANIC" => Ok(Self::Fatal),
            _ => Err(PanelError::Parse(format!("unknown severity: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(PanelError::Parse(format!("unknown sort order: {s}"))),
        }
    }
}

/// `key=glob` filter over string labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelFilter {
    pub key: String,
    pub value_glob: String,
}

impl LabelFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value_glob) = input
            .split_once('=')
            .ok_or_else(|| PanelError::Parse(format!("invalid label filter: {input}")))?;

        if key.trim().is_empty() || value_glob.trim().is_empty() {
            return Err(PanelError::Parse(format!("invalid label filter: {input}")));
        }

        Ok(Self {
            key: key.trim().to_string(),
            value_glob: value_glob.trim().to_string(),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        Pattern::new(&self.value_glob)
            .map(|p| p.matches(value))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self {
            since: None,
            until: None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| ts >= since) && self.until.is_none_or(|until| ts <= until)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn severity_parse() {
        assert_eq!(Severity::from_str("warn").unwrap(), Severity::Warn);
        assert_eq!(Severity::from_str("critical").unwrap(), Severity::Fatal);
        assert!(Severity::from_str("wat").is_err());
    }

    #[test]
    fn severity_from_otlp_number() {
        assert_eq!(Severity::from_number(17), Some(Severity::Error));
        assert_eq!(Severity::from_number(0), None);
        assert_eq!(Severity::Warn.to_string(), "WARN");
    }

    #[test]
    fn label_filter_parse_and_match() {
        let f = LabelFilter::parse("peer=redis:*").unwrap();
        assert_eq!(f.key, "peer");
        assert!(f.matches("redis:6379"));
        assert!(!f.matches("postgres:5432"));
        assert!(LabelFilter::parse("=x").is_err());
    }

    #[test]
    fn time_window_bounds_are_inclusive() {
        let since = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2026, 2, 1, 1, 0, 0).unwrap();
        let window = TimeWindow {
            since: Some(since),
            until: Some(until),
        };
        assert!(window.contains(since));
        assert!(window.contains(until));
        assert!(!window.contains(until + chrono::Duration::seconds(1)));
        assert!(TimeWindow::all().contains(since));
    }
}
