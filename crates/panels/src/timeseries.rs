use std::collections::BTreeMap;

use otpanel_core::calculation::CalculationType;
use otpanel_core::config::Config;
use otpanel_core::model::series::{TimeSeriesData, TimeSeriesValue};
use otpanel_core::palette::categorical_palette_color;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::legend::{ColumnAlign, LegendColumn, LegendItem, LegendOptions, SelectedItems};

pub const MAX_DECIMAL_PLACES: u8 = 20;
const DEFAULT_DECIMAL_PLACES: u8 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YAxisUnit {
    #[default]
    Decimal,
    /// Values already in percent (0-100).
    Percent,
    /// Fractions (0-1) shown as percent.
    PercentDecimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    #[serde(default)]
    pub unit: YAxisUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u8>,
}

impl FormatOptions {
    pub fn format(&self, value: f64) -> String {
        let places = usize::from(self.decimal_places.unwrap_or(DEFAULT_DECIMAL_PLACES));
        match self.unit {
            YAxisUnit::Decimal => format!("{value:.places$}"),
            YAxisUnit::Percent => format!("{value:.places$}%"),
            YAxisUnit::PercentDecimal => format!("{:.places$}%", value * 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YAxisOptions {
    #[serde(default)]
    pub format: FormatOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesChartOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<LegendOptions<CalculationType>>,
    #[serde(default)]
    pub y_axis: YAxisOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesModel {
    pub id: String,
    pub name: String,
    pub color: String,
    pub values: Vec<TimeSeriesValue>,
    /// Last numeric value, formatted with the y-axis format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesChartModel {
    pub series: Vec<SeriesModel>,
    pub legend_items: Vec<LegendItem>,
    pub legend_columns: Vec<LegendColumn>,
}

impl TimeSeriesChartModel {
    pub fn visible<'a>(&'a self, selected: &'a SelectedItems) -> impl Iterator<Item = &'a SeriesModel> {
        self.series.iter().filter(|s| selected.is_visible(&s.id))
    }
}

fn calculation_header(calc: CalculationType) -> &'static str {
    match calc {
        CalculationType::First => "First",
        CalculationType::Last => "Last",
        CalculationType::FirstNumber => "First *",
        CalculationType::LastNumber => "Last *",
        CalculationType::Mean => "Avg",
        CalculationType::Sum => "Sum",
        CalculationType::Min => "Min",
        CalculationType::Max => "Max",
    }
}

fn calculation_key(calc: CalculationType) -> String {
    serde_json::to_value(calc)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{calc:?}"))
}

pub fn build_time_series_chart(
    results: &[TimeSeriesData],
    options: &TimeSeriesChartOptions,
    theme: &Config,
) -> TimeSeriesChartModel {
    let format = options.y_axis.format;
    let table_values = options
        .legend
        .as_ref()
        .filter(|l| l.has_table_columns())
        .map(|l| l.values.clone())
        .unwrap_or_default();

    let mut model = TimeSeriesChartModel::default();
    let mut global_index = 0;
    for (query_index, result) in results.iter().enumerate() {
        for (series_index, series) in result.series.iter().enumerate() {
            let id = format!("{}{}{series_index}{query_index}", theme.chart_id, series.name);
            let color =
                categorical_palette_color(&theme.palette, global_index, &theme.fallback_color).to_string();
            let raw = series.raw_values();

            let data = table_values
                .iter()
                .filter_map(|calc| {
                    let value = calc.calculate(&raw)?;
                    Some((calculation_key(*calc), json!(format.format(value))))
                })
                .collect::<BTreeMap<_, _>>();

            model.legend_items.push(LegendItem {
                id: id.clone(),
                label: series.display_name().to_string(),
                color: color.clone(),
                data,
            });
            model.series.push(SeriesModel {
                id,
                name: series.display_name().to_string(),
                color,
                values: series.values.clone(),
                last_value: CalculationType::LastNumber.calculate(&raw).map(|v| format.format(v)),
            });
            global_index += 1;
        }
    }

    model.legend_columns = table_values
        .iter()
        .map(|calc| LegendColumn {
            accessor_key: format!("data.{}", calculation_key(*calc)),
            header: calculation_header(*calc).to_string(),
            header_description: None,
            width: 90,
            align: ColumnAlign::Right,
        })
        .collect();

    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legend::LegendMode;

    #[test]
    fn formats_units() {
        let f = |unit, places| FormatOptions {
            unit,
            decimal_places: places,
        };
        assert_eq!(f(YAxisUnit::Decimal, None).format(1.23456), "1.23");
        assert_eq!(f(YAxisUnit::Decimal, Some(0)).format(2.5001), "3");
        assert_eq!(f(YAxisUnit::Percent, Some(1)).format(42.0), "42.0%");
        assert_eq!(f(YAxisUnit::PercentDecimal, None).format(0.125), "12.50%");
    }

    #[test]
    fn colors_follow_global_series_index() {
        let theme = Config::default();
        let model = build_time_series_chart(
            &testkit::sample_series(),
            &TimeSeriesChartOptions::default(),
            &theme,
        );
        assert_eq!(model.series.len(), 3);
        assert_eq!(model.series[2].color, theme.palette[2]);
        assert_eq!(model.series[0].name, "2xx");
        assert_eq!(model.series[2].name, "latency_p99");
        assert_eq!(model.series[1].last_value.as_deref(), Some("2.00"));
    }

    #[test]
    fn table_legend_adds_calculated_columns() {
        let options = TimeSeriesChartOptions {
            legend: Some(LegendOptions {
                position: Default::default(),
                mode: LegendMode::Table,
                size: Default::default(),
                values: vec![CalculationType::Max, CalculationType::Mean],
            }),
            ..Default::default()
        };
        let model = build_time_series_chart(&testkit::sample_series(), &options, &Config::default());
        assert_eq!(model.legend_columns[0].accessor_key, "data.max");
        assert_eq!(model.legend_columns[1].header, "Avg");
        assert_eq!(model.legend_items[0].data["max"], json!("12.00"));
        assert_eq!(model.legend_items[0].data["mean"], json!("10.00"));
    }

    #[test]
    fn visible_follows_selection() {
        let model = build_time_series_chart(
            &testkit::sample_series(),
            &TimeSeriesChartOptions::default(),
            &Config::default(),
        );
        let selected = SelectedItems::All.click(&model.series[1].id, false);
        let visible: Vec<_> = model.visible(&selected).map(|s| s.name.as_str()).collect();
        assert_eq!(visible, vec!["5xx"]);
    }
}
