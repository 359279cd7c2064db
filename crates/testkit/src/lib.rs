use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status, TracesData};
use otpanel_core::model::log::{LogEntry, LogsData};
use otpanel_core::model::series::{TimeSeries, TimeSeriesData};
use otpanel_core::model::trace_search::{ServiceStats, TraceSearchData, TraceSearchResult};
use prost::Message;
use serde_json::{Value, json};

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const ROOT_SPAN: &str = "00000000000000a1";
pub const CACHE_SPAN: &str = "00000000000000b2";
pub const DB_SPAN: &str = "00000000000000c3";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// Nanosecond timestamp `offset_ms` after [`base_time`], as OTLP/JSON writes it.
pub fn nanos(offset_ms: i64) -> String {
    (base_time() + Duration::milliseconds(offset_ms))
        .timestamp_nanos_opt()
        .unwrap()
        .to_string()
}

pub fn span_json(
    span_id: &str,
    parent: Option<&str>,
    name: &str,
    start_ms: i64,
    end_ms: i64,
) -> Value {
    let mut span = json!({
        "traceId": TRACE_ID,
        "spanId": span_id,
        "name": name,
        "kind": 2,
        "startTimeUnixNano": nanos(start_ms),
        "endTimeUnixNano": nanos(end_ms),
    });
    if let Some(parent) = parent {
        span["parentSpanId"] = json!(parent);
    }
    span
}

pub fn resource_spans(service: &str, spans: Vec<Value>) -> Value {
    json!({
        "resource": {
            "attributes": [
                {"key": "service.name", "value": {"stringValue": service}}
            ]
        },
        "scopeSpans": [{
            "scope": {"name": "otpanel-testkit", "version": "1.0.0"},
            "spans": spans,
        }]
    })
}

/// One request through `api` that hits a failing redis call and a
/// postgres query:
///
/// ```text
/// GET /v1/orders            api       0..1800ms
/// ├── SELECT orders         postgres  100..800ms
/// └── cache.get redis       api       900..1600ms  ERROR
/// ```
pub fn sample_trace_json() -> Value {
    let root = span_json(ROOT_SPAN, None, "GET /v1/orders", 0, 1800);

    let mut cache = span_json(CACHE_SPAN, Some(ROOT_SPAN), "cache.get redis", 900, 1600);
    cache["kind"] = json!(3);
    cache["status"] = json!({"code": 2, "message": "context deadline exceeded"});
    cache["attributes"] = json!([
        {"key": "peer", "value": {"stringValue": "redis:6379"}},
        {"key": "retries", "value": {"intValue": "2"}}
    ]);
    // Out of order on purpose; the builder sorts events by time.
    cache["events"] = json!([
        {"name": "exception", "timeUnixNano": nanos(1200),
         "attributes": [{"key": "exception.message", "value": {"stringValue": "deadline exceeded"}}]},
        {"name": "retry", "timeUnixNano": nanos(950)}
    ]);

    let mut db = span_json(DB_SPAN, Some(ROOT_SPAN), "SELECT orders", 100, 800);
    db["kind"] = json!(3);
    db["links"] = json!([
        {"traceId": "0af7651916cd43dd8448eb211c80319c", "spanId": "b7ad6b7169203331"}
    ]);

    json!({
        "resourceSpans": [
            resource_spans("api", vec![root, cache]),
            resource_spans("postgres", vec![db]),
        ]
    })
}

pub fn sample_trace_bytes() -> Vec<u8> {
    serde_json::to_vec(&sample_trace_json()).unwrap()
}

/// Wraps arbitrary spans into a single-resource payload.
pub fn trace_payload(service: &str, spans: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({"resourceSpans": [resource_spans(service, spans)]})).unwrap()
}

pub fn sample_traces_proto() -> TracesData {
    let raw = sample_trace_json();
    let spans = &raw["resourceSpans"];
    let to_bytes = |hex: &str| -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    };

    let resource_spans = spans
        .as_array()
        .unwrap()
        .iter()
        .map(|rs| {
            let service = rs["resource"]["attributes"][0]["value"]["stringValue"]
                .as_str()
                .unwrap()
                .to_string();
            let spans = rs["scopeSpans"][0]["spans"]
                .as_array()
                .unwrap()
                .iter()
                .map(|s| Span {
                    trace_id: to_bytes(s["traceId"].as_str().unwrap()),
                    span_id: to_bytes(s["spanId"].as_str().unwrap()),
                    parent_span_id: s["parentSpanId"].as_str().map(to_bytes).unwrap_or_default(),
                    name: s["name"].as_str().unwrap().to_string(),
                    kind: s["kind"].as_i64().unwrap() as i32,
                    start_time_unix_nano: s["startTimeUnixNano"].as_str().unwrap().parse().unwrap(),
                    end_time_unix_nano: s["endTimeUnixNano"].as_str().unwrap().parse().unwrap(),
                    status: s["status"].as_object().map(|st| Status {
                        code: st["code"].as_i64().unwrap() as i32,
                        message: st["message"].as_str().unwrap_or_default().to_string(),
                    }),
                    ..Default::default()
                })
                .collect();
            ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![KeyValue {
                        key: "service.name".into(),
                        value: Some(AnyValue {
                            value: Some(any_value::Value::StringValue(service)),
                        }),
                    }],
                    ..Default::default()
                }),
                scope_spans: vec![ScopeSpans {
                    spans,
                    ..Default::default()
                }],
                ..Default::default()
            }
        })
        .collect();

    TracesData { resource_spans }
}

pub fn sample_trace_protobuf() -> Vec<u8> {
    sample_traces_proto().encode_to_vec()
}

fn series(name: &str, values: &[Option<f64>]) -> TimeSeries {
    let start = base_time().timestamp_millis();
    TimeSeries {
        name: name.to_string(),
        values: values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + i as i64 * 60_000, *v))
            .collect(),
        formatted_name: None,
        labels: None,
    }
}

/// Two queries: request counts per status class, then a single latency series.
pub fn sample_series() -> Vec<TimeSeriesData> {
    let mut err = series("http_requests{code=\"5xx\"}", &[Some(1.0), None, Some(2.0)]);
    err.formatted_name = Some("5xx".to_string());
    let mut ok = series("http_requests{code=\"2xx\"}", &[Some(10.0), Some(12.0), Some(8.0)]);
    ok.formatted_name = Some("2xx".to_string());
    vec![
        TimeSeriesData {
            series: vec![ok, err],
        },
        TimeSeriesData {
            series: vec![series("latency_p99", &[Some(0.2), Some(0.35), Some(0.3)])],
        },
    ]
}

fn log(offset_ms: i64, line: &str, labels: &[(&str, &str)]) -> LogEntry {
    let ts = base_time() + Duration::milliseconds(offset_ms);
    LogEntry {
        timestamp: ts.timestamp_millis() as f64 / 1000.0,
        line: line.to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn sample_logs() -> Vec<LogsData> {
    vec![LogsData {
        total_count: Some(3),
        entries: vec![
            log(0, "GET /v1/orders started", &[("service_name", "api"), ("level", "info")]),
            log(
                950,
                "retrying attempt=2",
                &[("service_name", "api"), ("level", "WARN"), ("peer", "redis:6379")],
            ),
            log(
                1200,
                "context deadline exceeded",
                &[("service_name", "api"), ("detected_level", "error"), ("peer", "redis:6379")],
            ),
        ],
    }]
}

pub fn sample_search() -> TraceSearchData {
    let start = base_time().timestamp_millis() as f64;
    let result = |trace_id: &str, service: &str, name: &str, duration: f64, spans: u64, errors| {
        let mut stats = BTreeMap::new();
        stats.insert(
            service.to_string(),
            ServiceStats {
                span_count: spans,
                error_count: errors,
            },
        );
        TraceSearchResult {
            trace_id: trace_id.to_string(),
            root_service_name: service.to_string(),
            root_trace_name: name.to_string(),
            start_time_unix_ms: start,
            duration_ms: duration,
            service_stats: stats,
        }
    };
    TraceSearchData {
        datasource_name: Some("tempo".to_string()),
        search_result: Some(vec![
            result(TRACE_ID, "api", "GET /v1/orders", 1800.0, 3, Some(1)),
            result("0af7651916cd43dd8448eb211c80319c", "api", "GET /healthz", 2.0, 1, None),
        ]),
    }
}
