use std::io::IsTerminal;

use otpanel_core::config::Config;
use otpanel_core::filter::Severity;
use otpanel_panels::PanelRegistry;
use otpanel_panels::gantt::{GanttChart, SpanDetail};
use otpanel_panels::logs_table::LogsTableModel;
use otpanel_panels::pie::PieChartModel;
use otpanel_panels::scatter::ScatterChartModel;
use otpanel_panels::timeseries::TimeSeriesChartModel;
use owo_colors::OwoColorize;

pub fn print_gantt_human(chart: &GanttChart, theme: &Config) {
    let trace = chart.trace();
    println!(
        "TRACE {} duration={} spans={} errors={} orphaned={}",
        trace.trace_id(),
        otpanel_core::time::format_duration(trace.duration_ms()),
        trace.len(),
        trace.error_count(),
        trace.orphaned_count()
    );

    let colored = std::io::stdout().is_terminal();
    for row in chart.rows(theme) {
        let indent = "  ".repeat(row.depth);
        let marker = if row.is_selected { "*" } else { " " };
        let status = if !row.is_error {
            String::new()
        } else if colored {
            format!(" {}", "ERROR".red())
        } else {
            " ERROR".to_string()
        };
        println!(
            "{marker}{indent}{} {} ({}) span={} offset={:.3}{status}",
            row.service, row.name, row.duration, row.span_id, row.offset
        );
    }
}

pub fn print_detail_human(v: &SpanDetail) {
    println!(
        "SPAN {} service={} name={} duration={} start=+{}",
        v.span_id, v.service, v.name, v.duration, v.start_offset
    );
    if !v.status_message.is_empty() {
        println!("status={}", v.status_message);
    }
    let tabs: Vec<_> = v.tabs.iter().map(|t| format!("{t:?}").to_lowercase()).collect();
    println!("tabs={} showing={}", tabs.join(","), format!("{:?}", v.tab).to_lowercase());

    for attr in &v.attributes {
        println!("  {}={} ({:?})", attr.key, attr.value, attr.source);
    }
    for event in &v.events {
        println!("event +{} {}", event.relative_time, event.name);
        for attr in &event.attributes {
            println!("  {}={}", attr.key, attr.value);
        }
    }
    for link in &v.links {
        println!("link trace={} span={}", link.trace_id, link.span_id);
    }
}

pub fn print_pie_human(v: &PieChartModel) {
    for slice in &v.data {
        println!(
            "{} value={} color={}",
            slice.name,
            format_optional(slice.value),
            slice.color
        );
    }
    if !v.legend_columns.is_empty() {
        for item in &v.legend_items {
            let cells: Vec<String> = item.data.iter().map(|(k, val)| format!("{k}={val}")).collect();
            println!("legend {} {}", item.label, cells.join(" "));
        }
    }
    println!("-- {} slices --", v.data.len());
}

pub fn print_scatter_human(v: &ScatterChartModel) {
    let ScatterChartModel::Chart { datasets, .. } = v else {
        println!("no traces found");
        return;
    };
    let mut total = 0;
    for (i, dataset) in datasets.iter().enumerate() {
        for point in &dataset.source {
            println!(
                "query={i} trace={} \"{}\" duration={}ms spans={} errors={} size={:.1} color={}",
                point.trace_id,
                point.name,
                point.duration_ms,
                point.span_count,
                point.error_count,
                point.symbol_size,
                point.color
            );
            if let Some(link) = &point.link {
                println!("  link={link}");
            }
            total += 1;
        }
    }
    println!("-- {total} traces in {} datasets --", datasets.len());
}

pub fn print_timeseries_human(v: &TimeSeriesChartModel) {
    for (series, item) in v.series.iter().zip(&v.legend_items) {
        let cells: Vec<String> = item
            .data
            .iter()
            .map(|(k, val)| format!("{k}={}", val.as_str().unwrap_or_default()))
            .collect();
        println!(
            "{} points={} last={} color={} {}",
            series.name,
            series.values.len(),
            series.last_value.as_deref().unwrap_or("-"),
            series.color,
            cells.join(" ")
        );
    }
    println!("-- {} series --", v.series.len());
}

pub fn print_logs_human(v: &LogsTableModel) {
    let colored = std::io::stdout().is_terminal();
    for row in &v.rows {
        let sev = row.severity.map(|s| severity_label(s, colored)).unwrap_or_else(|| "-".to_string());
        let labels: Vec<String> = row.labels.iter().map(|(k, val)| format!("{k}={val}")).collect();
        match &row.time {
            Some(time) => println!("{time} {sev} | {} {}", row.line, labels.join(" ")),
            None => println!("{sev} | {} {}", row.line, labels.join(" ")),
        }
    }
    match v.total_count {
        Some(total) => println!("-- {} rows ({total} total) --", v.rows.len()),
        None => println!("-- {} rows --", v.rows.len()),
    }
}

pub fn print_panels_human(registry: &PanelRegistry) {
    for plugin in registry.plugins() {
        println!(
            "{} \"{}\" query={}",
            plugin.kind, plugin.display_name, plugin.query_kind
        );
    }
}

fn severity_label(severity: Severity, colored: bool) -> String {
    let label = severity.label();
    if !colored {
        return label.to_string();
    }
    match severity {
        Severity::Trace => label.blue().to_string(),
        Severity::Debug => label.bright_black().to_string(),
        Severity::Info => label.green().to_string(),
        Severity::Warn => label.yellow().to_string(),
        Severity::Error => label.red().to_string(),
        Severity::Fatal => label.magenta().to_string(),
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
}
