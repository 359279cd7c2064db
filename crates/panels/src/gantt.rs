use otpanel_core::config::Config;
use otpanel_core::ids::SpanId;
use otpanel_core::model::span::{Attribute, Span};
use otpanel_core::model::trace::Trace;
use otpanel_core::palette::{PaletteMode, categorical_palette_color, consistent_color};
use otpanel_core::time::format_duration;
use otpanel_ingest::{PayloadFormat, build_trace};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Narrowest viewport a zoom can produce, in milliseconds.
const MIN_VIEWPORT_MS: f64 = 0.001;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GanttChartOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_span_id: Option<String>,
    /// Overrides the theme's palette mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette_mode: Option<PaletteMode>,
}

/// Visible time range of the chart, in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub start_time_unix_ms: f64,
    pub end_time_unix_ms: f64,
}

impl Viewport {
    pub fn new(start_time_unix_ms: f64, end_time_unix_ms: f64) -> Self {
        Self {
            start_time_unix_ms,
            end_time_unix_ms,
        }
    }

    pub fn of(trace: &Trace) -> Self {
        Self::new(trace.start_time_unix_ms(), trace.end_time_unix_ms())
    }

    pub fn duration_ms(&self) -> f64 {
        self.end_time_unix_ms - self.start_time_unix_ms
    }

    /// Fits the viewport inside `bounds`, shifting it when it sticks out and
    /// shrinking it to `bounds` when it is wider.
    pub fn clamp(self, bounds: Viewport) -> Self {
        let width = self.duration_ms().max(0.0);
        if width >= bounds.duration_ms() {
            return bounds;
        }
        let start = self
            .start_time_unix_ms
            .clamp(bounds.start_time_unix_ms, bounds.end_time_unix_ms - width);
        Self::new(start, start + width)
    }

    /// Scales the width by `factor` (below 1 zooms in) keeping `center_ms`
    /// at the same relative position, then clamps to `bounds`.
    pub fn zoom(self, center_ms: f64, factor: f64, bounds: Viewport) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return self;
        }
        let width = (self.duration_ms() * factor).max(MIN_VIEWPORT_MS);
        let rel = self.relative_position(center_ms).clamp(0.0, 1.0);
        let start = center_ms - width * rel;
        Self::new(start, start + width).clamp(bounds)
    }

    /// Where `ts` sits in the viewport: 0 at the start, 1 at the end.
    pub fn relative_position(&self, ts: f64) -> f64 {
        let width = self.duration_ms();
        if width <= 0.0 {
            return 0.0;
        }
        (ts - self.start_time_unix_ms) / width
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GanttRow {
    pub index: usize,
    pub span_id: SpanId,
    pub depth: usize,
    pub service: String,
    pub name: String,
    pub duration: String,
    /// Start offset as a fraction of the viewport.
    pub offset: f64,
    /// Width as a fraction of the viewport.
    pub width: f64,
    pub color: String,
    pub is_error: bool,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailTab {
    #[default]
    Attributes,
    Events,
    Links,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSource {
    Span,
    Resource,
    Scope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeRow {
    pub key: String,
    pub value: String,
    pub source: AttributeSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub name: String,
    /// Offset from trace start, e.g. `950ms`.
    pub relative_time: String,
    pub attributes: Vec<AttributeRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRow {
    pub trace_id: String,
    pub span_id: String,
    pub attributes: Vec<AttributeRow>,
}

/// Everything the detail pane shows for one span.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanDetail {
    pub span_id: SpanId,
    pub service: String,
    pub name: String,
    pub duration: String,
    pub start_offset: String,
    pub status_message: String,
    pub tabs: Vec<DetailTab>,
    pub tab: DetailTab,
    pub attributes: Vec<AttributeRow>,
    pub events: Vec<EventRow>,
    pub links: Vec<LinkRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GanttChart {
    trace: Trace,
    viewport: Viewport,
    selected: Option<usize>,
    palette_mode: Option<PaletteMode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum GanttView {
    Ready(GanttChart),
    Error { message: String },
}

impl GanttView {
    /// Parses and builds the trace. A payload that does not parse becomes
    /// [`GanttView::Error`] instead of an error result.
    pub fn from_payload(bytes: &[u8], format: PayloadFormat, options: &GanttChartOptions) -> Self {
        match build_trace(bytes, format) {
            Ok(trace) => Self::Ready(GanttChart::new(trace, options)),
            Err(err) => {
                warn!(error = %err, "rendering trace fallback");
                Self::Error {
                    message: format!("unable to parse trace: {err}"),
                }
            }
        }
    }

    pub fn chart(&self) -> Option<&GanttChart> {
        match self {
            Self::Ready(chart) => Some(chart),
            Self::Error { .. } => None,
        }
    }

    pub fn chart_mut(&mut self) -> Option<&mut GanttChart> {
        match self {
            Self::Ready(chart) => Some(chart),
            Self::Error { .. } => None,
        }
    }
}

impl GanttChart {
    pub fn new(trace: Trace, options: &GanttChartOptions) -> Self {
        let mut chart = Self {
            viewport: Viewport::of(&trace),
            trace,
            selected: None,
            palette_mode: options.palette_mode,
        };
        if let Some(id) = options.selected_span_id.as_deref() {
            if !chart.select(id) {
                debug!(span_id = id, "selected span not in trace");
            }
        }
        chart
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport.clamp(Viewport::of(&self.trace));
    }

    pub fn zoom(&mut self, center_ms: f64, factor: f64) {
        self.viewport = self.viewport.zoom(center_ms, factor, Viewport::of(&self.trace));
    }

    pub fn reset_zoom(&mut self) {
        self.viewport = Viewport::of(&self.trace);
    }

    /// Selects a span by hex id; returns false (and keeps the current
    /// selection) when the id does not resolve.
    pub fn select(&mut self, span_id: &str) -> bool {
        let Ok(id) = SpanId::parse(span_id) else {
            return false;
        };
        match self.trace.index_of(&id) {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&Span> {
        self.selected.and_then(|i| self.trace.get(i))
    }

    pub fn rows(&self, theme: &Config) -> Vec<GanttRow> {
        let mode = self.palette_mode.unwrap_or(theme.gantt_palette_mode);
        let services = self.trace.services();
        let width = self.viewport.duration_ms();

        self.trace
            .walk()
            .into_iter()
            .map(|(depth, span)| {
                let index = self.trace.index_of(&span.span_id).unwrap_or_default();
                let service = span.service_name();
                let color = if span.is_error() {
                    theme.error_color.clone()
                } else {
                    service_color(mode, &services, service, theme).to_string()
                };
                let (offset, span_width) = if width > 0.0 {
                    (
                        self.viewport.relative_position(span.start_time_unix_ms),
                        span.duration_ms() / width,
                    )
                } else {
                    (0.0, 1.0)
                };
                GanttRow {
                    index,
                    span_id: span.span_id.clone(),
                    depth,
                    service: service.to_string(),
                    name: span.name.clone(),
                    duration: span.formatted_duration(),
                    offset,
                    width: span_width,
                    color,
                    is_error: span.is_error(),
                    is_selected: self.selected == Some(index),
                }
            })
            .collect()
    }

    /// Detail pane for the selected span. An unavailable `tab` falls back
    /// to attributes.
    pub fn detail(&self, tab: DetailTab) -> Option<SpanDetail> {
        self.selected().map(|span| span_detail(&self.trace, span, tab))
    }
}

fn service_color<'a>(mode: PaletteMode, services: &[&str], service: &str, theme: &'a Config) -> &'a str {
    match mode {
        PaletteMode::Auto => consistent_color(&theme.palette, service, &theme.fallback_color),
        PaletteMode::Categorical => {
            let index = services.iter().position(|s| *s == service).unwrap_or_default();
            categorical_palette_color(&theme.palette, index, &theme.fallback_color)
        }
    }
}

fn attribute_rows(attrs: &[Attribute], source: AttributeSource) -> impl Iterator<Item = AttributeRow> + '_ {
    attrs.iter().map(move |a| AttributeRow {
        key: a.key.clone(),
        value: a.value.to_string(),
        source,
    })
}

pub fn span_detail(trace: &Trace, span: &Span, tab: DetailTab) -> SpanDetail {
    let mut tabs = vec![DetailTab::Attributes];
    if !span.events.is_empty() {
        tabs.push(DetailTab::Events);
    }
    if !span.links.is_empty() {
        tabs.push(DetailTab::Links);
    }
    let tab = if tabs.contains(&tab) { tab } else { DetailTab::Attributes };

    let attributes = attribute_rows(&span.attributes, AttributeSource::Span)
        .chain(attribute_rows(&span.resource.attributes, AttributeSource::Resource))
        .chain(attribute_rows(&span.scope.attributes, AttributeSource::Scope))
        .collect();

    let trace_start = trace.start_time_unix_ms();
    let events = span
        .events
        .iter()
        .map(|event| EventRow {
            name: event.name.clone(),
            relative_time: format_duration(event.time_unix_ms - trace_start),
            attributes: attribute_rows(&event.attributes, AttributeSource::Span).collect(),
        })
        .collect();

    let links = span
        .links
        .iter()
        .map(|link| LinkRow {
            trace_id: link.trace_id.to_string(),
            span_id: link.span_id.to_string(),
            attributes: attribute_rows(&link.attributes, AttributeSource::Span).collect(),
        })
        .collect();

    SpanDetail {
        span_id: span.span_id.clone(),
        service: span.service_name().to_string(),
        name: span.name.clone(),
        duration: span.formatted_duration(),
        start_offset: format_duration(span.start_time_unix_ms - trace_start),
        status_message: span.status.message.clone(),
        tabs,
        tab,
        attributes,
        events,
        links,
    }
}
