use std::collections::BTreeMap;
use std::fmt;

use otpanel_core::config::Config;
use otpanel_core::ids::SpanId;
use otpanel_core::model::log::LogsData;
use otpanel_core::model::series::TimeSeriesData;
use otpanel_core::model::trace_search::TraceSearchData;
use otpanel_core::palette::is_hex_color;
use otpanel_core::{PanelError, Result};
use otpanel_ingest::PayloadFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gantt::{GanttChartOptions, GanttView};
use crate::logs_table::{LogQuery, LogsTableModel, LogsTableOptions, build_logs_table};
use crate::pie::{PieChartModel, PieChartOptions, build_pie_chart};
use crate::scatter::{ScatterChartModel, ScatterChartOptions, build_scatter_chart};
use crate::timeseries::{
    MAX_DECIMAL_PLACES, TimeSeriesChartModel, TimeSeriesChartOptions, build_time_series_chart,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PanelKind {
    PieChart,
    ScatterChart,
    TimeSeriesChart,
    LogsTable,
    TracingGanttChart,
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PieChart => "PieChart",
            Self::ScatterChart => "ScatterChart",
            Self::TimeSeriesChart => "TimeSeriesChart",
            Self::LogsTable => "LogsTable",
            Self::TracingGanttChart => "TracingGanttChart",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    TimeSeriesQuery,
    TraceQuery,
    LogQuery,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TimeSeriesQuery => "TimeSeriesQuery",
            Self::TraceQuery => "TraceQuery",
            Self::LogQuery => "LogQuery",
        };
        f.write_str(name)
    }
}

/// A panel definition: its kind plus the options for that kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum PanelOptions {
    PieChart(PieChartOptions),
    ScatterChart(ScatterChartOptions),
    TimeSeriesChart(TimeSeriesChartOptions),
    LogsTable(LogsTableOptions),
    TracingGanttChart(GanttChartOptions),
}

impl PanelOptions {
    pub fn kind(&self) -> PanelKind {
        match self {
            Self::PieChart(_) => PanelKind::PieChart,
            Self::ScatterChart(_) => PanelKind::ScatterChart,
            Self::TimeSeriesChart(_) => PanelKind::TimeSeriesChart,
            Self::LogsTable(_) => PanelKind::LogsTable,
            Self::TracingGanttChart(_) => PanelKind::TracingGanttChart,
        }
    }
}

/// Query results handed to a panel.
#[derive(Debug, Clone)]
pub enum PanelData {
    TimeSeries(Vec<TimeSeriesData>),
    TraceSearch(Vec<TraceSearchData>),
    Trace { payload: Vec<u8>, format: PayloadFormat },
    Logs(Vec<LogsData>),
}

impl PanelData {
    pub fn query_kind(&self) -> QueryKind {
        match self {
            Self::TimeSeries(_) => QueryKind::TimeSeriesQuery,
            Self::TraceSearch(_) | Self::Trace { .. } => QueryKind::TraceQuery,
            Self::Logs(_) => QueryKind::LogQuery,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "model")]
pub enum PanelOutput {
    PieChart(PieChartModel),
    ScatterChart(ScatterChartModel),
    TimeSeriesChart(TimeSeriesChartModel),
    LogsTable(LogsTableModel),
    TracingGanttChart(GanttView),
}

#[derive(Debug, Clone, Copy)]
pub struct PanelPlugin {
    pub kind: PanelKind,
    pub display_name: &'static str,
    pub query_kind: QueryKind,
    pub create_initial_options: fn() -> PanelOptions,
    pub validate: fn(&PanelOptions) -> Result<()>,
}

#[derive(Debug, Clone, Default)]
pub struct PanelRegistry {
    plugins: BTreeMap<PanelKind, PanelPlugin>,
}

impl PanelRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(PanelPlugin {
            kind: PanelKind::PieChart,
            display_name: "Pie Chart",
            query_kind: QueryKind::TimeSeriesQuery,
            create_initial_options: || PanelOptions::PieChart(PieChartOptions::default()),
            validate: validate_pie,
        });
        registry.register(PanelPlugin {
            kind: PanelKind::ScatterChart,
            display_name: "Scatter Chart",
            query_kind: QueryKind::TraceQuery,
            create_initial_options: || PanelOptions::ScatterChart(ScatterChartOptions::default()),
            validate: validate_scatter,
        });
        registry.register(PanelPlugin {
            kind: PanelKind::TimeSeriesChart,
            display_name: "Time Series Chart",
            query_kind: QueryKind::TimeSeriesQuery,
            create_initial_options: || PanelOptions::TimeSeriesChart(TimeSeriesChartOptions::default()),
            validate: validate_time_series,
        });
        registry.register(PanelPlugin {
            kind: PanelKind::LogsTable,
            display_name: "Logs Table",
            query_kind: QueryKind::LogQuery,
            create_initial_options: || PanelOptions::LogsTable(LogsTableOptions::default()),
            validate: |_| Ok(()),
        });
        registry.register(PanelPlugin {
            kind: PanelKind::TracingGanttChart,
            display_name: "Tracing Gantt Chart",
            query_kind: QueryKind::TraceQuery,
            create_initial_options: || PanelOptions::TracingGanttChart(GanttChartOptions::default()),
            validate: validate_gantt,
        });
        registry
    }

    /// Adds or replaces the plugin for its kind.
    pub fn register(&mut self, plugin: PanelPlugin) {
        self.plugins.insert(plugin.kind, plugin);
    }

    pub fn get(&self, kind: PanelKind) -> Option<&PanelPlugin> {
        self.plugins.get(&kind)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &PanelPlugin> {
        self.plugins.values()
    }

    pub fn validate(&self, panel: &PanelOptions) -> Result<()> {
        let plugin = self.plugin_for(panel.kind())?;
        (plugin.validate)(panel)
    }

    /// Validates the options, checks the data is what the panel queries for,
    /// and builds the panel's view model.
    pub fn render(&self, panel: &PanelOptions, data: PanelData, theme: &Config) -> Result<PanelOutput> {
        let plugin = self.plugin_for(panel.kind())?;
        (plugin.validate)(panel)?;
        if data.query_kind() != plugin.query_kind {
            return Err(PanelError::InvalidArgument(format!(
                "{} expects {} data, got {}",
                plugin.kind,
                plugin.query_kind,
                data.query_kind()
            )));
        }
        debug!(kind = %plugin.kind, "rendering panel");

        let output = match (panel, data) {
            (PanelOptions::PieChart(options), PanelData::TimeSeries(results)) => {
                PanelOutput::PieChart(build_pie_chart(&results, options, theme))
            }
            (PanelOptions::TimeSeriesChart(options), PanelData::TimeSeries(results)) => {
                PanelOutput::TimeSeriesChart(build_time_series_chart(&results, options, theme))
            }
            (PanelOptions::ScatterChart(options), PanelData::TraceSearch(results)) => {
                PanelOutput::ScatterChart(build_scatter_chart(&results, options, theme))
            }
            (PanelOptions::LogsTable(options), PanelData::Logs(results)) => {
                PanelOutput::LogsTable(build_logs_table(&results, &LogQuery::default(), *options))
            }
            (PanelOptions::TracingGanttChart(options), PanelData::Trace { payload, format }) => {
                PanelOutput::TracingGanttChart(GanttView::from_payload(&payload, format, options))
            }
            (panel, data) => {
                return Err(PanelError::InvalidArgument(format!(
                    "{} cannot render {:?} data",
                    panel.kind(),
                    data.query_kind()
                )));
            }
        };
        Ok(output)
    }

    fn plugin_for(&self, kind: PanelKind) -> Result<&PanelPlugin> {
        self.get(kind)
            .ok_or_else(|| PanelError::InvalidArgument(format!("no plugin registered for {kind}")))
    }
}

fn wrong_kind(expected: PanelKind, panel: &PanelOptions) -> PanelError {
    PanelError::InvalidArgument(format!("expected {expected} options, got {}", panel.kind()))
}

fn validate_pie(panel: &PanelOptions) -> Result<()> {
    let PanelOptions::PieChart(options) = panel else {
        return Err(wrong_kind(PanelKind::PieChart, panel));
    };
    for (query, color) in &options.query_colors {
        if !is_hex_color(color) {
            return Err(PanelError::InvalidArgument(format!(
                "query {query} color must be #rgb or #rrggbb, got {color}"
            )));
        }
    }
    Ok(())
}

fn validate_scatter(panel: &PanelOptions) -> Result<()> {
    let PanelOptions::ScatterChart(options) = panel else {
        return Err(wrong_kind(PanelKind::ScatterChart, panel));
    };
    if let Some([min, max]) = options.size_range {
        if !(min > 0.0 && max > 0.0 && min <= max) {
            return Err(PanelError::InvalidArgument(format!(
                "size range must be positive and ordered, got [{min}, {max}]"
            )));
        }
    }
    Ok(())
}

fn validate_time_series(panel: &PanelOptions) -> Result<()> {
    let PanelOptions::TimeSeriesChart(options) = panel else {
        return Err(wrong_kind(PanelKind::TimeSeriesChart, panel));
    };
    match options.y_axis.format.decimal_places {
        Some(places) if places > MAX_DECIMAL_PLACES => Err(PanelError::InvalidArgument(format!(
            "decimal places must be at most {MAX_DECIMAL_PLACES}, got {places}"
        ))),
        _ => Ok(()),
    }
}

fn validate_gantt(panel: &PanelOptions) -> Result<()> {
    let PanelOptions::TracingGanttChart(options) = panel else {
        return Err(wrong_kind(PanelKind::TracingGanttChart, panel));
    };
    if let Some(id) = options.selected_span_id.as_deref() {
        SpanId::parse(id)
            .map_err(|e| PanelError::InvalidArgument(format!("selected span id: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::scatter::ScatterChartModel;

    #[test]
    fn builtin_registers_every_kind() {
        let registry = PanelRegistry::builtin();
        let kinds: Vec<_> = registry.plugins().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PanelKind::PieChart,
                PanelKind::ScatterChart,
                PanelKind::TimeSeriesChart,
                PanelKind::LogsTable,
                PanelKind::TracingGanttChart,
            ]
        );
        for plugin in registry.plugins() {
            let initial = (plugin.create_initial_options)();
            assert_eq!(initial.kind(), plugin.kind);
            assert!(registry.validate(&initial).is_ok());
        }
    }

    #[test]
    fn options_round_trip_as_tagged_json() {
        let panel: PanelOptions =
            serde_json::from_str(r#"{"kind":"ScatterChart","spec":{"sizeRange":[4,12]}}"#).unwrap();
        assert_eq!(
            panel,
            PanelOptions::ScatterChart(ScatterChartOptions {
                size_range: Some([4.0, 12.0]),
                link: None,
            })
        );
        let value = serde_json::to_value(&panel).unwrap();
        assert_eq!(value["kind"], "ScatterChart");
    }

    #[test]
    fn validation_rejects_bad_options() {
        let registry = PanelRegistry::builtin();

        let pie = PanelOptions::PieChart(PieChartOptions {
            query_colors: BTreeMap::from([(0, "red".to_string())]),
            ..Default::default()
        });
        assert!(registry.validate(&pie).is_err());

        let scatter = PanelOptions::ScatterChart(ScatterChartOptions {
            size_range: Some([20.0, 6.0]),
            link: None,
        });
        assert!(registry.validate(&scatter).is_err());

        let mut ts = TimeSeriesChartOptions::default();
        ts.y_axis.format.decimal_places = Some(21);
        assert!(registry.validate(&PanelOptions::TimeSeriesChart(ts)).is_err());

        let gantt = PanelOptions::TracingGanttChart(GanttChartOptions {
            selected_span_id: Some("xyz".to_string()),
            ..Default::default()
        });
        assert!(registry.validate(&gantt).is_err());
    }

    #[test]
    fn render_dispatches_by_kind() {
        let registry = PanelRegistry::builtin();
        let theme = Config::default();

        let output = registry
            .render(
                &PanelOptions::ScatterChart(ScatterChartOptions::default()),
                PanelData::TraceSearch(vec![testkit::sample_search()]),
                &theme,
            )
            .unwrap();
        assert!(matches!(
            output,
            PanelOutput::ScatterChart(ScatterChartModel::Chart { .. })
        ));

        let output = registry
            .render(
                &PanelOptions::TracingGanttChart(GanttChartOptions::default()),
                PanelData::Trace {
                    payload: b"garbage".to_vec(),
                    format: PayloadFormat::Json,
                },
                &theme,
            )
            .unwrap();
        assert!(matches!(
            output,
            PanelOutput::TracingGanttChart(GanttView::Error { .. })
        ));
    }

    #[test]
    fn render_rejects_mismatched_data() {
        let registry = PanelRegistry::builtin();
        let err = registry
            .render(
                &PanelOptions::PieChart(PieChartOptions::default()),
                PanelData::Logs(testkit::sample_logs()),
                &Config::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("PieChart expects TimeSeriesQuery data"));

        let err = registry
            .render(
                &PanelOptions::TracingGanttChart(GanttChartOptions::default()),
                PanelData::TraceSearch(Vec::new()),
                &Config::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("cannot render"));
    }
}
