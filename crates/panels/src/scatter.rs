use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use otpanel_core::config::Config;
use otpanel_core::model::trace_search::TraceSearchData;
use otpanel_core::time::ms_to_datetime;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIZE_RANGE: [f64; 2] = [6.0, 20.0];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterChartOptions {
    /// Bubble diameter range, smallest to largest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_range: Option<[f64; 2]>,
    /// Where a bubble links to. Supports `${datasourceName}` and `${traceId}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterPoint {
    pub name: String,
    pub trace_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_ms: f64,
    pub span_count: u64,
    pub error_count: u64,
    pub symbol_size: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterDataset {
    pub source: Vec<ScatterPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ScatterChartModel {
    NoData,
    Chart {
        datasets: Vec<ScatterDataset>,
        min_span_count: u64,
        max_span_count: u64,
    },
}

/// Maps `value` from `range` onto `size_range` linearly. A zero-width
/// range maps everything to the largest size.
pub fn symbol_size(value: f64, range: [f64; 2], size_range: [f64; 2]) -> f64 {
    let [min, max] = range;
    let [min_size, max_size] = size_range;
    if max - min == 0.0 {
        return max_size;
    }
    let rel = (value - min) / (max - min);
    min_size + (max_size - min_size) * rel
}

/// Fills `${name}` and `$name` placeholders from `vars`; unknown names are
/// left as written.
pub fn interpolate_link(template: &str, vars: &BTreeMap<&str, &str>) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("${{{name}}}"), value);
    }
    for (name, value) in vars {
        out = out.replace(&format!("${name}"), value);
    }
    out
}

/// One dataset per query. Bubble size follows the span count across all
/// queries, traces with errors use the theme's error color.
pub fn build_scatter_chart(
    results: &[TraceSearchData],
    options: &ScatterChartOptions,
    theme: &Config,
) -> ScatterChartModel {
    let traces_found = results
        .iter()
        .any(|r| r.search_result.as_ref().is_some_and(|s| !s.is_empty()));
    if !traces_found {
        return ScatterChartModel::NoData;
    }

    let counts = results
        .iter()
        .filter_map(|r| r.search_result.as_ref())
        .flatten()
        .map(|t| t.span_count());
    let (min_span_count, max_span_count) = counts.fold((u64::MAX, 0), |(lo, hi), c| (lo.min(c), hi.max(c)));

    let size_range = options
        .size_range
        .unwrap_or([theme.size_range.0, theme.size_range.1]);

    let datasets = results
        .iter()
        .filter_map(|result| {
            let traces = result.search_result.as_ref()?;
            let datasource = result.datasource_name.as_deref().unwrap_or_default();
            let source = traces
                .iter()
                .map(|trace| {
                    let span_count = trace.span_count();
                    let error_count = trace.error_count();
                    let vars = BTreeMap::from([
                        ("datasourceName", datasource),
                        ("traceId", trace.trace_id.as_str()),
                    ]);
                    ScatterPoint {
                        name: format!("{}: {}", trace.root_service_name, trace.root_trace_name),
                        trace_id: trace.trace_id.clone(),
                        start_time: ms_to_datetime(trace.start_time_unix_ms),
                        duration_ms: trace.duration_ms,
                        span_count,
                        error_count,
                        symbol_size: symbol_size(
                            span_count as f64,
                            [min_span_count as f64, max_span_count as f64],
                            size_range,
                        ),
                        color: if error_count > 0 {
                            theme.error_color.clone()
                        } else {
                            theme.scatter_default_color.clone()
                        },
                        link: options.link.as_deref().map(|t| interpolate_link(t, &vars)),
                    }
                })
                .collect();
            Some(ScatterDataset { source })
        })
        .collect();

    ScatterChartModel::Chart {
        datasets,
        min_span_count,
        max_span_count,
    }
}

#[cfg(test)]
mod tests {
    use otpanel_core::model::trace_search::TraceSearchData;

    use super::*;

    #[test]
    fn degenerate_range_returns_max_size() {
        assert_eq!(symbol_size(5.0, [0.0, 0.0], [6.0, 20.0]), 20.0);
        assert_eq!(symbol_size(3.0, [3.0, 3.0], [1.0, 9.0]), 9.0);
    }

    #[test]
    fn scales_linearly() {
        assert_eq!(symbol_size(0.0, [0.0, 10.0], [6.0, 20.0]), 6.0);
        assert_eq!(symbol_size(5.0, [0.0, 10.0], [6.0, 20.0]), 13.0);
        assert_eq!(symbol_size(10.0, [0.0, 10.0], [6.0, 20.0]), 20.0);
    }

    #[test]
    fn interpolates_both_placeholder_styles() {
        let vars = BTreeMap::from([("datasourceName", "tempo"), ("traceId", "abc")]);
        assert_eq!(
            interpolate_link("/explore?ds=${datasourceName}&trace=$traceId", &vars),
            "/explore?ds=tempo&trace=abc"
        );
        assert_eq!(interpolate_link("/x/${other}", &vars), "/x/${other}");
    }

    #[test]
    fn no_results_is_no_data() {
        let empty = TraceSearchData::default();
        let model = build_scatter_chart(&[empty], &ScatterChartOptions::default(), &Config::default());
        assert_eq!(model, ScatterChartModel::NoData);
    }

    #[test]
    fn builds_points_with_sizes_colors_and_links() {
        let options = ScatterChartOptions {
            size_range: Some([2.0, 10.0]),
            link: Some("/trace/${traceId}?ds=${datasourceName}".to_string()),
        };
        let theme = Config::default();
        let ScatterChartModel::Chart {
            datasets,
            min_span_count,
            max_span_count,
        } = build_scatter_chart(&[testkit::sample_search()], &options, &theme)
        else {
            panic!("expected a chart");
        };

        assert_eq!((min_span_count, max_span_count), (1, 3));
        let points = &datasets[0].source;
        assert_eq!(points[0].name, "api: GET /v1/orders");
        assert_eq!(points[0].symbol_size, 10.0);
        assert_eq!(points[0].color, theme.error_color);
        assert_eq!(
            points[0].link.as_deref(),
            Some(format!("/trace/{}?ds=tempo", testkit::TRACE_ID).as_str())
        );
        assert_eq!(points[1].symbol_size, 2.0);
        assert_eq!(points[1].color, theme.scatter_default_color);
    }
}
