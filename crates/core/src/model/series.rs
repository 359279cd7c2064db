use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `(unix ms, value)`; a `None` value is a gap in the series.
pub type TimeSeriesValue = (i64, Option<f64>);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub name: String,
    #[serde(default)]
    pub values: Vec<TimeSeriesValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl TimeSeries {
    pub fn display_name(&self) -> &str {
        self.formatted_name.as_deref().unwrap_or(&self.name)
    }

    pub fn raw_values(&self) -> Vec<Option<f64>> {
        self.values.iter().map(|(_, v)| *v).collect()
    }
}

/// Result of one time-series query; a panel receives one per query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesData {
    #[serde(default)]
    pub series: Vec<TimeSeries>,
}
