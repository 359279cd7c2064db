use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{SpanId, TraceId};
use crate::time::format_duration;

/// Position of a span inside a nested resource/scope/span payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanLocation {
    pub resource: usize,
    pub scope: usize,
    pub span: usize,
}

impl fmt::Display for SpanLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resourceSpans[{}].scopeSpans[{}].spans[{}]",
            self.resource, self.scope, self.span
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    Bytes(Vec<u8>),
    Array(Vec<AttributeValue>),
    KvList(Vec<Attribute>),
    Empty,
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Array(values) => {
                let parts = values.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::KvList(kvs) => {
                let parts = kvs
                    .iter()
                    .map(|kv| format!("{}={}", kv.key, kv.value))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, AttributeValue::String(value.into()))
    }
}

pub fn find_attribute<'a>(attrs: &'a [Attribute], key: &str) -> Option<&'a AttributeValue> {
    attrs.iter().find(|a| a.key == key).map(|a| &a.value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub service_name: String,
    pub attributes: Vec<Attribute>,
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    pub version: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn from_otlp(kind: i32) -> Self {
        match kind {
            1 => Self::Internal,
            2 => Self::Server,
            3 => Self::Client,
            4 => Self::Producer,
            5 => Self::Consumer,
            _ => Self::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    pub fn from_otlp(code: i32) -> Self {
        match code {
            1 => Self::Ok,
            2 => Self::Error,
            _ => Self::Unset,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanStatus {
    pub code: StatusCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_ms: f64,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub attributes: Vec<Attribute>,
}

/// One span as decoded from a payload, before it is linked into a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub location: SpanLocation,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_ms: f64,
    pub end_time_unix_ms: f64,
    pub status: SpanStatus,
    pub attributes: Vec<Attribute>,
    pub resource: Resource,
    pub scope: Scope,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
}

/// A span inside a built [`crate::model::trace::Trace`].
///
/// `parent` and `children` are indices into the trace's span arena.
/// `children` keeps payload order; use `Trace::children` for start-time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_ms: f64,
    pub end_time_unix_ms: f64,
    pub status: SpanStatus,
    pub attributes: Vec<Attribute>,
    pub resource: Resource,
    pub scope: Scope,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Span {
    pub fn duration_ms(&self) -> f64 {
        (self.end_time_unix_ms - self.start_time_unix_ms).max(0.0)
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_ms())
    }

    pub fn service_name(&self) -> &str {
        &self.resource.service_name
    }

    pub fn is_error(&self) -> bool {
        self.status.code == StatusCode::Error
    }
}

impl From<SpanRecord> for Span {
    fn from(record: SpanRecord) -> Self {
        Self {
            span_id: record.span_id,
            parent_span_id: record.parent_span_id,
            name: record.name,
            kind: record.kind,
            start_time_unix_ms: record.start_time_unix_ms,
            end_time_unix_ms: record.end_time_unix_ms,
            status: record.status,
            attributes: record.attributes,
            resource: record.resource,
            scope: record.scope,
            events: record.events,
            links: record.links,
            parent: None,
            children: Vec::new(),
        }
    }
}
