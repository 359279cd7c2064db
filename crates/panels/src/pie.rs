use std::cmp::Ordering;
use std::collections::BTreeMap;

use otpanel_core::calculation::CalculationType;
use otpanel_core::config::Config;
use otpanel_core::filter::SortOrder;
use otpanel_core::model::series::TimeSeriesData;
use otpanel_core::palette::{categorical_palette_color, gradient_color};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::legend::{ColumnAlign, LegendColumn, LegendItem, LegendOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieChartMode {
    #[default]
    Value,
    Percentage,
}

/// Extra columns a table legend can show for each slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonValue {
    Abs,
    Relative,
}

impl ComparisonValue {
    pub fn key(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Relative => "relative",
        }
    }

    fn header(self) -> (&'static str, &'static str) {
        match self {
            Self::Abs => ("Absolute", "Absolute value"),
            Self::Relative => ("Relative", "Relative value"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieChartOptions {
    #[serde(default)]
    pub calculation: CalculationType,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub mode: PieChartMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<LegendOptions<ComparisonValue>>,
    /// Custom color per query index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_colors: BTreeMap<usize, String>,
}

/// One pie slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieChartData {
    pub id: String,
    pub name: String,
    pub value: Option<f64>,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieChartModel {
    pub data: Vec<PieChartData>,
    pub legend_items: Vec<LegendItem>,
    pub legend_columns: Vec<LegendColumn>,
}

/// Replaces each value with its share of the non-null total, in percent.
/// Nulls become 0, and so does everything when the total is 0.
pub fn calculate_percentages(data: &[PieChartData]) -> Vec<PieChartData> {
    let sum: f64 = data.iter().filter_map(|d| d.value).sum();
    data.iter()
        .map(|d| {
            let pct = match d.value {
                Some(v) if sum != 0.0 => 100.0 * v / sum,
                _ => 0.0,
            };
            PieChartData {
                value: Some(pct),
                ..d.clone()
            }
        })
        .collect()
}

/// Stable sort by value. Nulls go last whatever the order.
pub fn sort_series_data(mut data: Vec<PieChartData>, order: SortOrder) -> Vec<PieChartData> {
    data.sort_by(|a, b| match (a.value, b.value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match order {
            SortOrder::Asc => x.total_cmp(&y),
            SortOrder::Desc => y.total_cmp(&x),
        },
    });
    data
}

pub fn build_pie_chart(
    results: &[TimeSeriesData],
    options: &PieChartOptions,
    theme: &Config,
) -> PieChartModel {
    let mut data = Vec::new();
    let mut legend_items = Vec::new();

    let mut global_index = 0;
    for (query_index, result) in results.iter().enumerate() {
        let custom_color = options.query_colors.get(&query_index);
        let count = result.series.len();

        for (series_index, series) in result.series.iter().enumerate() {
            let color = match custom_color {
                Some(base) if count > 1 => {
                    let factor = series_index as f64 / (count - 1).max(1) as f64;
                    gradient_color(base, factor)
                }
                Some(base) => base.clone(),
                None => categorical_palette_color(&theme.palette, global_index, &theme.fallback_color)
                    .to_string(),
            };

            let id = format!("{}{}{series_index}{query_index}", theme.chart_id, series.name);
            let name = series.display_name().to_string();
            legend_items.push(LegendItem {
                id: id.clone(),
                label: name.clone(),
                color: color.clone(),
                data: BTreeMap::new(),
            });
            data.push(PieChartData {
                id,
                name,
                value: options.calculation.calculate(&series.raw_values()),
                color,
            });
            global_index += 1;
        }
    }

    let sorted = sort_series_data(data, options.sort);
    let mut legend_columns = Vec::new();

    if let Some(legend) = options.legend.as_ref().filter(|l| l.has_table_columns()) {
        let mut values = legend.values.clone();
        values.sort();
        values.dedup();

        let percentages = calculate_percentages(&sorted);
        for value in values {
            let (header, description) = value.header();
            legend_columns.push(LegendColumn {
                accessor_key: format!("data.{}", value.key()),
                header: header.to_string(),
                header_description: Some(description.to_string()),
                width: 90,
                align: ColumnAlign::Right,
            });

            let source = match value {
                ComparisonValue::Abs => &sorted,
                ComparisonValue::Relative => &percentages,
            };
            for item in &mut legend_items {
                let Some(v) = source.iter().find(|d| d.id == item.id).and_then(|d| d.value) else {
                    continue;
                };
                let cell = match value {
                    ComparisonValue::Abs => json!(v),
                    ComparisonValue::Relative => json!(format!("{v:.2}%")),
                };
                item.data.insert(value.key().to_string(), cell);
            }
        }
    }

    let data = match options.mode {
        PieChartMode::Percentage => calculate_percentages(&sorted),
        PieChartMode::Value => sorted,
    };

    PieChartModel {
        data,
        legend_items,
        legend_columns,
    }
}
