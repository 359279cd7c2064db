//! OTLP/JSON trace payloads.
//!
//! The JSON encoding differs from protobuf in a few ways that matter here:
//! ids are hex strings (some backends send base64), 64-bit integers may be
//! strings, and enums may be spelled out. Everything is normalized into the
//! protobuf message types so the rest of the crate has a single decode path.
//!
//! Span ids, timestamps and enums are read as raw JSON values and checked
//! per span, so a mistyped field is reported with its span location rather
//! than as a document-level decode failure.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, ArrayValue, InstrumentationScope, KeyValue, KeyValueList,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::span::{Event, Link};
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status, TracesData};
use otpanel_core::TraceParseError;
use otpanel_core::ids::{SpanId, TraceId};
use otpanel_core::model::span::SpanLocation;
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonTracesData {
    #[serde(default, alias = "batches")]
    resource_spans: Vec<JsonResourceSpans>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonResourceSpans {
    #[serde(default)]
    resource: Option<JsonResource>,
    #[serde(default, alias = "instrumentationLibrarySpans")]
    scope_spans: Vec<JsonScopeSpans>,
    #[serde(default)]
    schema_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonResource {
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
    #[serde(default)]
    dropped_attributes_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonScopeSpans {
    #[serde(default, alias = "instrumentationLibrary")]
    scope: Option<JsonScope>,
    #[serde(default)]
    spans: Vec<JsonSpan>,
    #[serde(default)]
    schema_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonScope {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonSpan {
    #[serde(default)]
    trace_id: JsonValue,
    #[serde(default)]
    span_id: JsonValue,
    #[serde(default)]
    parent_span_id: JsonValue,
    #[serde(default)]
    trace_state: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: JsonValue,
    #[serde(default)]
    start_time_unix_nano: JsonValue,
    #[serde(default)]
    end_time_unix_nano: JsonValue,
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
    #[serde(default)]
    events: Vec<JsonEvent>,
    #[serde(default)]
    links: Vec<JsonLink>,
    #[serde(default)]
    status: Option<JsonStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEvent {
    #[serde(default)]
    time_unix_nano: JsonValue,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonLink {
    #[serde(default)]
    trace_id: JsonValue,
    #[serde(default)]
    span_id: JsonValue,
    #[serde(default)]
    trace_state: String,
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonStatus {
    #[serde(default)]
    code: JsonValue,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonKeyValue {
    key: String,
    #[serde(default)]
    value: Option<JsonAnyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonAnyValue {
    string_value: Option<String>,
    bool_value: Option<bool>,
    int_value: Option<JsonValue>,
    double_value: Option<f64>,
    bytes_value: Option<String>,
    array_value: Option<JsonArrayValue>,
    kvlist_value: Option<JsonKvList>,
}

#[derive(Debug, Deserialize)]
struct JsonArrayValue {
    #[serde(default)]
    values: Vec<JsonAnyValue>,
}

#[derive(Debug, Deserialize)]
struct JsonKvList {
    #[serde(default)]
    values: Vec<JsonKeyValue>,
}

/// 64-bit integers arrive either as JSON numbers or as decimal strings.
fn json_u64(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Enums arrive as numbers or as their protobuf names. Anything else is
/// treated as unspecified.
fn json_enum(value: &JsonValue, names: &[(&str, i32)]) -> i32 {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or_default(),
        JsonValue::String(name) => names
            .iter()
            .find(|(n, _)| *n == name.as_str())
            .map(|(_, code)| *code)
            .unwrap_or_default(),
        _ => 0,
    }
}

const SPAN_KINDS: [(&str, i32); 5] = [
    ("SPAN_KIND_INTERNAL", 1),
    ("SPAN_KIND_SERVER", 2),
    ("SPAN_KIND_CLIENT", 3),
    ("SPAN_KIND_PRODUCER", 4),
    ("SPAN_KIND_CONSUMER", 5),
];

const STATUS_CODES: [(&str, i32); 2] = [("STATUS_CODE_OK", 1), ("STATUS_CODE_ERROR", 2)];

/// Parses an OTLP/JSON trace payload, optionally wrapped as `{"trace": …}`.
pub fn parse_traces(raw: &[u8]) -> Result<TracesData, TraceParseError> {
    let mut doc: JsonValue = serde_json::from_slice(raw)
        .map_err(|e| TraceParseError::Decode(format!("invalid OTLP/JSON: {e}")))?;
    if let Some(inner) = doc.get_mut("trace").map(JsonValue::take) {
        doc = inner;
    }
    let data: JsonTracesData = serde_json::from_value(doc)
        .map_err(|e| TraceParseError::Decode(format!("invalid OTLP/JSON: {e}")))?;

    let mut resource_spans = Vec::with_capacity(data.resource_spans.len());
    for (ri, rs) in data.resource_spans.into_iter().enumerate() {
        let mut scope_spans = Vec::with_capacity(rs.scope_spans.len());
        for (si, ss) in rs.scope_spans.into_iter().enumerate() {
            let mut spans = Vec::with_capacity(ss.spans.len());
            for (pi, span) in ss.spans.into_iter().enumerate() {
                let location = SpanLocation {
                    resource: ri,
                    scope: si,
                    span: pi,
                };
                spans.push(convert_span(location, span)?);
            }
            scope_spans.push(ScopeSpans {
                scope: ss.scope.map(convert_scope),
                spans,
                schema_url: ss.schema_url,
            });
        }
        resource_spans.push(ResourceSpans {
            resource: rs.resource.map(|r| Resource {
                attributes: convert_attributes(r.attributes),
                dropped_attributes_count: r.dropped_attributes_count,
                ..Default::default()
            }),
            scope_spans,
            schema_url: rs.schema_url,
        });
    }

    Ok(TracesData { resource_spans })
}

fn convert_span(location: SpanLocation, span: JsonSpan) -> Result<Span, TraceParseError> {
    let trace_id = trace_id_bytes(location, "traceId", &span.trace_id)?;
    let span_id = span_id_bytes(location, "spanId", &span.span_id)?;
    let parent_span_id = span_id_bytes(location, "parentSpanId", &span.parent_span_id)?;
    let start_time_unix_nano = nanos(location, "startTimeUnixNano", &span.start_time_unix_nano)?;
    let end_time_unix_nano = nanos(location, "endTimeUnixNano", &span.end_time_unix_nano)?;

    let mut events = Vec::with_capacity(span.events.len());
    for event in span.events {
        events.push(Event {
            time_unix_nano: nanos(location, "events.timeUnixNano", &event.time_unix_nano)?,
            name: event.name,
            attributes: convert_attributes(event.attributes),
            ..Default::default()
        });
    }

    let mut links = Vec::with_capacity(span.links.len());
    for link in span.links {
        links.push(Link {
            trace_id: trace_id_bytes(location, "links.traceId", &link.trace_id)?,
            span_id: span_id_bytes(location, "links.spanId", &link.span_id)?,
            trace_state: link.trace_state,
            attributes: convert_attributes(link.attributes),
            ..Default::default()
        });
    }

    Ok(Span {
        trace_id,
        span_id,
        parent_span_id,
        trace_state: span.trace_state,
        name: span.name,
        kind: json_enum(&span.kind, &SPAN_KINDS),
        start_time_unix_nano,
        end_time_unix_nano,
        attributes: convert_attributes(span.attributes),
        events,
        links,
        status: span.status.map(|s| Status {
            message: s.message,
            code: json_enum(&s.code, &STATUS_CODES),
        }),
        ..Default::default()
    })
}

fn convert_scope(scope: JsonScope) -> InstrumentationScope {
    InstrumentationScope {
        name: scope.name,
        version: scope.version,
        attributes: convert_attributes(scope.attributes),
        ..Default::default()
    }
}

fn convert_attributes(attrs: Vec<JsonKeyValue>) -> Vec<KeyValue> {
    attrs
        .into_iter()
        .map(|kv| KeyValue {
            key: kv.key,
            value: kv.value.map(convert_any_value),
        })
        .collect()
}

fn convert_any_value(value: JsonAnyValue) -> AnyValue {
    let value = if let Some(s) = value.string_value {
        Some(Value::StringValue(s))
    } else if let Some(b) = value.bool_value {
        Some(Value::BoolValue(b))
    } else if let Some(i) = value.int_value.as_ref().and_then(json_i64) {
        Some(Value::IntValue(i))
    } else if let Some(d) = value.double_value {
        Some(Value::DoubleValue(d))
    } else if let Some(b) = value.bytes_value {
        Some(Value::BytesValue(
            STANDARD.decode(&b).unwrap_or_else(|_| b.into_bytes()),
        ))
    } else if let Some(array) = value.array_value {
        Some(Value::ArrayValue(ArrayValue {
            values: array.values.into_iter().map(convert_any_value).collect(),
        }))
    } else {
        value.kvlist_value.map(|kvs| {
            Value::KvlistValue(KeyValueList {
                values: convert_attributes(kvs.values),
            })
        })
    };
    AnyValue { value }
}

fn nanos(
    location: SpanLocation,
    field: &'static str,
    value: &JsonValue,
) -> Result<u64, TraceParseError> {
    if value.is_null() {
        return Ok(0);
    }
    json_u64(value).ok_or_else(|| TraceParseError::InvalidField {
        location,
        field,
        reason: format!("not an unsigned nanosecond timestamp: {value}"),
    })
}

fn id_text<'a>(
    location: SpanLocation,
    field: &'static str,
    value: &'a JsonValue,
) -> Result<&'a str, TraceParseError> {
    match value {
        JsonValue::Null => Ok(""),
        JsonValue::String(s) => Ok(s),
        other => Err(TraceParseError::InvalidField {
            location,
            field,
            reason: format!("expected a hex or base64 string, got {other}"),
        }),
    }
}

// Empty and all-zero ids both mean "absent"; the decoder decides whether
// absence is an error for the field in question.
fn trace_id_bytes(
    location: SpanLocation,
    field: &'static str,
    raw: &JsonValue,
) -> Result<Vec<u8>, TraceParseError> {
    let raw = id_text(location, field, raw)?;
    if is_absent_id(raw) {
        return Ok(Vec::new());
    }
    TraceId::parse(raw)
        .map(|id| id.to_bytes())
        .map_err(|e| TraceParseError::InvalidField {
            location,
            field,
            reason: e.to_string(),
        })
}

fn span_id_bytes(
    location: SpanLocation,
    field: &'static str,
    raw: &JsonValue,
) -> Result<Vec<u8>, TraceParseError> {
    let raw = id_text(location, field, raw)?;
    if is_absent_id(raw) {
        return Ok(Vec::new());
    }
    SpanId::parse(raw)
        .map(|id| id.to_bytes())
        .map_err(|e| TraceParseError::InvalidField {
            location,
            field,
            reason: e.to_string(),
        })
}

fn is_absent_id(raw: &str) -> bool {
    raw.trim().chars().all(|c| c == '0')
}
