mod output;
mod telemetry;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use otpanel_core::config::Config;
use otpanel_core::filter::{LabelFilter, SortOrder, TimeWindow};
use otpanel_core::model::trace_search::TraceSearchData;
use otpanel_core::time::parse_time_or_relative;
use otpanel_ingest::PayloadFormat;
use otpanel_ingest::payload::{decode_logs, decode_series, parse_one_or_many};
use otpanel_panels::gantt::{DetailTab, GanttChartOptions, GanttView};
use otpanel_panels::logs_table::{LogQuery, LogsTableOptions, build_logs_table};
use otpanel_panels::pie::{PieChartOptions, build_pie_chart};
use otpanel_panels::registry::QueryKind;
use otpanel_panels::scatter::{ScatterChartOptions, build_scatter_chart};
use otpanel_panels::timeseries::{TimeSeriesChartOptions, build_time_series_chart};
use otpanel_panels::{PanelData, PanelKind, PanelOptions, PanelOutput, PanelRegistry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::output::{
    print_detail_human, print_gantt_human, print_logs_human, print_panels_human, print_pie_human,
    print_scatter_human, print_timeseries_human,
};
use crate::telemetry::init_cli_tracing;

/// Exit status when a trace payload cannot be parsed and the fallback is shown.
const EXIT_TRACE_FALLBACK: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "otpanel")]
#[command(about = "Build panel view models from trace, metric and log payloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Theme config file (TOML)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Show a trace as Gantt rows")]
    Trace {
        file: PathBuf,
        #[arg(long, default_value = "auto")]
        format: String,
        #[arg(long, help = "Span id to mark as selected")]
        select: Option<String>,
    },
    #[command(about = "Show the detail pane for one span")]
    Span {
        file: PathBuf,
        span_id: String,
        #[arg(long, default_value = "auto")]
        format: String,
        #[arg(long, default_value = "attributes")]
        tab: String,
    },
    #[command(about = "Build a pie chart from time series frames")]
    Pie {
        file: PathBuf,
        #[arg(long, help = "Pie chart options as JSON")]
        options: Option<String>,
    },
    #[command(about = "Build a scatter chart from trace search results")]
    Scatter {
        file: PathBuf,
        #[arg(long, help = "Scatter chart options as JSON")]
        options: Option<String>,
    },
    #[command(about = "Build a time series chart from time series frames")]
    Timeseries {
        file: PathBuf,
        #[arg(long, help = "Time series chart options as JSON")]
        options: Option<String>,
    },
    #[command(about = "Show log frames as table rows")]
    Logs {
        file: PathBuf,
        #[arg(long = "where")]
        where_filters: Vec<String>,
        #[arg(long, help = "Regex the log line must match")]
        grep: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value = "desc")]
        sort: String,
        #[arg(long, help = "Hide the time column")]
        no_time: bool,
    },
    #[command(about = "Render a panel definition against a data file")]
    Panel {
        panel: PathBuf,
        data: PathBuf,
        #[arg(long, default_value = "auto")]
        format: String,
    },
    #[command(about = "List the built-in panel kinds")]
    Panels,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_cli_tracing();

    let theme = load_theme(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Trace {
            file,
            format,
            select,
        } => {
            let options = GanttChartOptions {
                selected_span_id: select,
                palette_mode: None,
            };
            let view = GanttView::from_payload(&read_file(&file)?, format.parse()?, &options);
            print_gantt(&view, &theme, json)
        }
        Commands::Span {
            file,
            span_id,
            format,
            tab,
        } => {
            let tab = parse_tab(&tab)?;
            let mut view =
                GanttView::from_payload(&read_file(&file)?, format.parse()?, &GanttChartOptions::default());
            let Some(chart) = view.chart_mut() else {
                return print_gantt(&view, &theme, json);
            };
            if !chart.select(&span_id) {
                anyhow::bail!("span {span_id} not found in trace");
            }
            let detail = chart
                .detail(tab)
                .with_context(|| format!("no detail for span {span_id}"))?;
            if json {
                print_json(&detail)?;
            } else {
                print_detail_human(&detail);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Pie { file, options } => {
            let options: PieChartOptions = parse_options(options.as_deref())?;
            let frames = decode_series(&read_file(&file)?, PayloadFormat::Auto)?;
            let model = build_pie_chart(&frames, &options, &theme);
            if json {
                print_json(&model)?;
            } else {
                print_pie_human(&model);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Scatter { file, options } => {
            let options: ScatterChartOptions = parse_options(options.as_deref())?;
            let results = read_search_results(&file)?;
            let model = build_scatter_chart(&results, &options, &theme);
            if json {
                print_json(&model)?;
            } else {
                print_scatter_human(&model);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Timeseries { file, options } => {
            let options: TimeSeriesChartOptions = parse_options(options.as_deref())?;
            let frames = decode_series(&read_file(&file)?, PayloadFormat::Auto)?;
            let model = build_time_series_chart(&frames, &options, &theme);
            if json {
                print_json(&model)?;
            } else {
                print_timeseries_human(&model);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logs {
            file,
            where_filters,
            grep,
            since,
            until,
            sort,
            no_time,
        } => {
            let mut query = LogQuery {
                filters: where_filters
                    .iter()
                    .map(|f| LabelFilter::parse(f))
                    .collect::<otpanel_core::Result<Vec<_>>>()?,
                line: None,
                window: parse_window(since, until)?,
                order: sort.parse::<SortOrder>()?,
            };
            if let Some(pattern) = grep {
                query = query.with_line_pattern(&pattern)?;
            }
            let options = LogsTableOptions {
                show_time: !no_time,
                ..Default::default()
            };
            let frames = decode_logs(&read_file(&file)?, PayloadFormat::Auto)?;
            let model = build_logs_table(&frames, &query, options);
            if json {
                print_json(&model)?;
            } else {
                print_logs_human(&model);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Panel {
            panel,
            data,
            format,
        } => {
            let raw = read_file(&panel)?;
            let panel: PanelOptions = serde_json::from_slice(&raw)
                .with_context(|| format!("parse panel definition {}", panel.display()))?;
            let registry = PanelRegistry::builtin();
            let data = load_panel_data(&registry, &panel, &read_file(&data)?, format.parse()?)?;
            let output = registry.render(&panel, data, &theme)?;
            print_panel_output(&output, &theme, json)
        }
        Commands::Panels => {
            let registry = PanelRegistry::builtin();
            if json {
                let plugins: Vec<_> = registry
                    .plugins()
                    .map(|p| {
                        serde_json::json!({
                            "kind": p.kind,
                            "displayName": p.display_name,
                            "queryKind": p.query_kind,
                            "initialOptions": (p.create_initial_options)(),
                        })
                    })
                    .collect();
                print_json(&plugins)?;
            } else {
                print_panels_human(&registry);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_theme(path: Option<&Path>) -> anyhow::Result<Config> {
    let theme = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let theme = theme.context("load theme config")?;
    debug!(palette = theme.palette.len(), chart_id = %theme.chart_id, "theme loaded");
    Ok(theme)
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read {}", path.display()))
}

fn read_search_results(path: &Path) -> anyhow::Result<Vec<TraceSearchData>> {
    Ok(parse_one_or_many(&read_file(path)?)?)
}

fn parse_options<T: DeserializeOwned + Default>(raw: Option<&str>) -> anyhow::Result<T> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("parse --options"),
        None => Ok(T::default()),
    }
}

fn parse_window(since: Option<String>, until: Option<String>) -> anyhow::Result<TimeWindow> {
    let since = since.map(|v| parse_time_or_relative(&v)).transpose()?;
    let until = until.map(|v| parse_time_or_relative(&v)).transpose()?;
    Ok(TimeWindow { since, until })
}

fn parse_tab(s: &str) -> anyhow::Result<DetailTab> {
    match s {
        "attributes" => Ok(DetailTab::Attributes),
        "events" => Ok(DetailTab::Events),
        "links" => Ok(DetailTab::Links),
        other => anyhow::bail!("invalid tab: {other}"),
    }
}

fn load_panel_data(
    registry: &PanelRegistry,
    panel: &PanelOptions,
    bytes: &[u8],
    format: PayloadFormat,
) -> anyhow::Result<PanelData> {
    let plugin = registry
        .get(panel.kind())
        .with_context(|| format!("no plugin for {}", panel.kind()))?;
    let data = match (plugin.query_kind, panel.kind()) {
        (QueryKind::TimeSeriesQuery, _) => PanelData::TimeSeries(decode_series(bytes, format)?),
        (QueryKind::LogQuery, _) => PanelData::Logs(decode_logs(bytes, format)?),
        (QueryKind::TraceQuery, PanelKind::TracingGanttChart) => PanelData::Trace {
            payload: bytes.to_vec(),
            format,
        },
        (QueryKind::TraceQuery, _) => PanelData::TraceSearch(parse_one_or_many(bytes)?),
    };
    Ok(data)
}

fn print_gantt(view: &GanttView, theme: &Config, json: bool) -> anyhow::Result<ExitCode> {
    match view {
        GanttView::Ready(chart) => {
            if json {
                print_json(&serde_json::json!({
                    "traceId": chart.trace().trace_id(),
                    "durationMs": chart.trace().duration_ms(),
                    "orphaned": chart.trace().orphaned_count(),
                    "viewport": chart.viewport(),
                    "rows": chart.rows(theme),
                }))?;
            } else {
                print_gantt_human(chart, theme);
            }
            Ok(ExitCode::SUCCESS)
        }
        GanttView::Error { message } => {
            if json {
                print_json(view)?;
            } else {
                println!("{message}");
            }
            Ok(ExitCode::from(EXIT_TRACE_FALLBACK))
        }
    }
}

fn print_panel_output(output: &PanelOutput, theme: &Config, json: bool) -> anyhow::Result<ExitCode> {
    if let PanelOutput::TracingGanttChart(view) = output {
        return print_gantt(view, theme, json);
    }
    if json {
        print_json(output)?;
        return Ok(ExitCode::SUCCESS);
    }
    match output {
        PanelOutput::PieChart(model) => print_pie_human(model),
        PanelOutput::ScatterChart(model) => print_scatter_human(model),
        PanelOutput::TimeSeriesChart(model) => print_timeseries_human(model),
        PanelOutput::LogsTable(model) => print_logs_human(model),
        PanelOutput::TracingGanttChart(_) => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
