use std::collections::{BTreeMap, HashMap};

use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::logs::v1::LogRecord as OtlpLogRecord;
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use opentelemetry_proto::tonic::metrics::v1::number_data_point;
use opentelemetry_proto::tonic::metrics::v1::{MetricsData, NumberDataPoint};
use opentelemetry_proto::tonic::resource::v1::Resource as OtlpResource;
use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use opentelemetry_proto::tonic::trace::v1::span::{Event as OtlpEvent, Link as OtlpLink};
use otpanel_core::TraceParseError;
use otpanel_core::filter::Severity;
use otpanel_core::ids::{SpanId, TraceId};
use otpanel_core::model::log::LogEntry;
use otpanel_core::model::series::TimeSeries;
use otpanel_core::model::span::{
    Attribute, AttributeValue, Resource, Scope, SpanEvent, SpanKind, SpanLink, SpanLocation,
    SpanRecord, SpanStatus, StatusCode,
};
use otpanel_core::time::nanos_to_ms;
use tracing::debug;

const SERVICE_NAME: &str = "service.name";

/// Flattens resource → scope → span nesting into span records, each tagged
/// with its resource and scope and with its position in the payload.
pub fn decode_trace_spans(data: &TracesData) -> Result<Vec<SpanRecord>, TraceParseError> {
    let mut out = Vec::new();
    for (ri, rs) in data.resource_spans.iter().enumerate() {
        let resource = decode_resource(rs.resource.as_ref());
        for (si, ss) in rs.scope_spans.iter().enumerate() {
            let scope = decode_scope(ss.scope.as_ref());
            for (pi, span) in ss.spans.iter().enumerate() {
                let location = SpanLocation {
                    resource: ri,
                    scope: si,
                    span: pi,
                };
                out.push(decode_span(location, &resource, &scope, span)?);
            }
        }
    }
    Ok(out)
}

pub fn decode_span(
    location: SpanLocation,
    resource: &Resource,
    scope: &Scope,
    span: &OtlpSpan,
) -> Result<SpanRecord, TraceParseError> {
    let invalid = |field: &'static str, e: otpanel_core::PanelError| TraceParseError::InvalidField {
        location,
        field,
        reason: e.to_string(),
    };

    if span.trace_id.is_empty() {
        return Err(TraceParseError::MissingField {
            location,
            field: "traceId",
        });
    }
    if span.span_id.is_empty() {
        return Err(TraceParseError::MissingField {
            location,
            field: "spanId",
        });
    }

    let trace_id = TraceId::from_bytes(&span.trace_id).map_err(|e| invalid("traceId", e))?;
    let span_id = SpanId::from_bytes(&span.span_id).map_err(|e| invalid("spanId", e))?;
    let parent_span_id = if span.parent_span_id.is_empty() {
        None
    } else {
        Some(SpanId::from_bytes(&span.parent_span_id).map_err(|e| invalid("parentSpanId", e))?)
    };

    let links = span
        .links
        .iter()
        .map(|link| decode_link(link).map_err(|e| invalid("links", e)))
        .collect::<Result<Vec<_>, _>>()?;

    let status = span
        .status
        .as_ref()
        .map(|s| SpanStatus {
            code: StatusCode::from_otlp(s.code),
            message: s.message.clone(),
        })
        .unwrap_or_default();

    Ok(SpanRecord {
        location,
        trace_id,
        span_id,
        parent_span_id,
        name: span.name.clone(),
        kind: SpanKind::from_otlp(span.kind),
        start_time_unix_ms: nanos_to_ms(span.start_time_unix_nano),
        end_time_unix_ms: nanos_to_ms(span.end_time_unix_nano),
        status,
        attributes: decode_attributes(&span.attributes),
        resource: resource.clone(),
        scope: scope.clone(),
        events: span.events.iter().map(decode_event).collect(),
        links,
    })
}

fn decode_event(event: &OtlpEvent) -> SpanEvent {
    SpanEvent {
        name: event.name.clone(),
        time_unix_ms: nanos_to_ms(event.time_unix_nano),
        attributes: decode_attributes(&event.attributes),
    }
}

fn decode_link(link: &OtlpLink) -> otpanel_core::Result<SpanLink> {
    Ok(SpanLink {
        trace_id: TraceId::from_bytes(&link.trace_id)?,
        span_id: SpanId::from_bytes(&link.span_id)?,
        attributes: decode_attributes(&link.attributes),
    })
}

pub fn decode_resource(resource: Option<&OtlpResource>) -> Resource {
    let Some(resource) = resource else {
        return Resource::default();
    };
    Resource {
        service_name: service_name(Some(resource)),
        attributes: decode_attributes(&resource.attributes),
    }
}

pub fn decode_scope(scope: Option<&InstrumentationScope>) -> Scope {
    scope
        .map(|s| Scope {
            name: s.name.clone(),
            version: s.version.clone(),
            attributes: decode_attributes(&s.attributes),
        })
        .unwrap_or_default()
}

/// Log rows carry everything as string labels: the record attributes plus
/// service, severity and trace correlation.
pub fn decode_log(resource: Option<&OtlpResource>, record: &OtlpLogRecord) -> LogEntry {
    let ts_nanos = if record.time_unix_nano == 0 {
        record.observed_time_unix_nano
    } else {
        record.time_unix_nano
    };

    let mut labels: BTreeMap<String, String> = record
        .attributes
        .iter()
        .map(|kv| (kv.key.clone(), any_value_to_string(kv.value.as_ref())))
        .collect();
    labels.insert("service_name".to_string(), service_name(resource));

    let level = if record.severity_text.is_empty() {
        Severity::from_number(record.severity_number).map(|s| s.label().to_ascii_lowercase())
    } else {
        Some(record.severity_text.to_ascii_lowercase())
    };
    if let Some(level) = level {
        labels.insert("level".to_string(), level);
    }
    if let Some(trace_id) = bytes_to_hex(&record.trace_id) {
        labels.insert("trace_id".to_string(), trace_id);
    }
    if let Some(span_id) = bytes_to_hex(&record.span_id) {
        labels.insert("span_id".to_string(), span_id);
    }

    LogEntry {
        timestamp: nanos_to_ms(ts_nanos) / 1000.0,
        line: any_value_to_string(record.body.as_ref()),
        labels,
    }
}

pub fn decode_logs(data: &LogsData) -> Vec<LogEntry> {
    let mut out = Vec::new();
    for rl in &data.resource_logs {
        let resource = rl.resource.as_ref();
        for sl in &rl.scope_logs {
            out.extend(sl.log_records.iter().map(|r| decode_log(resource, r)));
        }
    }
    out
}

/// Groups gauge and sum points into one series per metric name and
/// attribute set. Other metric kinds have no single value per point and
/// are skipped.
pub fn decode_metrics(data: &MetricsData) -> Vec<TimeSeries> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, TimeSeries> = HashMap::new();

    for rm in &data.resource_metrics {
        let service = service_name(rm.resource.as_ref());
        for sm in &rm.scope_metrics {
            for metric in &sm.metrics {
                let points = match &metric.data {
                    Some(Data::Gauge(g)) => &g.data_points,
                    Some(Data::Sum(s)) => &s.data_points,
                    _ => {
                        debug!(metric = %metric.name, "skipping non-numeric metric");
                        continue;
                    }
                };
                for point in points {
                    let mut labels: BTreeMap<String, String> = point
                        .attributes
                        .iter()
                        .map(|kv| (kv.key.clone(), any_value_to_string(kv.value.as_ref())))
                        .collect();
                    labels.insert("service_name".to_string(), service.clone());
                    let name = series_name(&metric.name, &labels);

                    let series = by_name.entry(name.clone()).or_insert_with(|| {
                        order.push(name.clone());
                        TimeSeries {
                            name,
                            values: Vec::new(),
                            formatted_name: None,
                            labels: Some(labels),
                        }
                    });
                    series.values.push(decode_point(point));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .map(|mut series| {
            series.values.sort_by_key(|(ts, _)| *ts);
            series
        })
        .collect()
}

fn decode_point(point: &NumberDataPoint) -> (i64, Option<f64>) {
    let value = point.value.as_ref().map(|v| match v {
        number_data_point::Value::AsDouble(d) => *d,
        number_data_point::Value::AsInt(i) => *i as f64,
    });
    (nanos_to_ms(point.time_unix_nano) as i64, value)
}

fn series_name(metric: &str, labels: &BTreeMap<String, String>) -> String {
    let pairs = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>();
    format!("{metric}{{{}}}", pairs.join(", "))
}

fn service_name(resource: Option<&OtlpResource>) -> String {
    if let Some(resource) = resource {
        for kv in &resource.attributes {
            if kv.key == SERVICE_NAME {
                return any_value_to_string(kv.value.as_ref());
            }
        }
    }
    "unknown".to_string()
}

pub fn decode_attributes(attrs: &[KeyValue]) -> Vec<Attribute> {
    attrs
        .iter()
        .map(|kv| Attribute::new(kv.key.clone(), decode_any_value(kv.value.as_ref())))
        .collect()
}

fn decode_any_value(value: Option<&AnyValue>) -> AttributeValue {
    match value.and_then(|v| v.value.as_ref()) {
        Some(Value::StringValue(s)) => AttributeValue::String(s.clone()),
        Some(Value::BoolValue(b)) => AttributeValue::Bool(*b),
        Some(Value::IntValue(i)) => AttributeValue::Int(*i),
        Some(Value::DoubleValue(d)) => AttributeValue::Double(*d),
        Some(Value::BytesValue(b)) => AttributeValue::Bytes(b.clone()),
        Some(Value::ArrayValue(array)) => AttributeValue::Array(
            array
                .values
                .iter()
                .map(|v| decode_any_value(Some(v)))
                .collect(),
        ),
        Some(Value::KvlistValue(kvs)) => AttributeValue::KvList(decode_attributes(&kvs.values)),
        None => AttributeValue::Empty,
    }
}

fn any_value_to_string(value: Option<&AnyValue>) -> String {
    decode_any_value(value).to_string()
}

fn bytes_to_hex(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[cfg(test)]
mod tests {
    use opentelemetry_proto::tonic::common::v1::any_value::Value;
    use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
    use opentelemetry_proto::tonic::logs::v1::LogRecord as OtlpLogRecord;
    use opentelemetry_proto::tonic::metrics::v1::{
        Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, metric,
    };
    use opentelemetry_proto::tonic::resource::v1::Resource as OtlpResource;
    use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Status};

    use super::*;

    fn string_kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.into(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.into())),
            }),
        }
    }

    fn api_resource() -> OtlpResource {
        OtlpResource {
            attributes: vec![string_kv("service.name", "api")],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_log_and_service() {
        let log = OtlpLogRecord {
            time_unix_nano: 1_700_000_000_000_000_000,
            severity_number: 17,
            body: Some(AnyValue {
                value: Some(Value::StringValue("boom".into())),
            }),
            attributes: vec![string_kv("peer", "redis:6379")],
            trace_id: vec![1; 16],
            span_id: vec![2; 8],
            ..Default::default()
        };

        let out = decode_log(Some(&api_resource()), &log);
        assert_eq!(out.line, "boom");
        assert_eq!(out.timestamp, 1_700_000_000.0);
        assert_eq!(out.labels["service_name"], "api");
        assert_eq!(out.labels["level"], "error");
        assert_eq!(out.labels["peer"], "redis:6379");
        assert_eq!(out.labels["trace_id"], "01010101010101010101010101010101");
    }

    #[test]
    fn decodes_span_with_resource_and_status() {
        let data = TracesData {
            resource_spans: vec![ResourceSpans {
                resource: Some(api_resource()),
                scope_spans: vec![ScopeSpans {
                    spans: vec![OtlpSpan {
                        trace_id: vec![1; 16],
                        span_id: vec![2; 8],
                        parent_span_id: vec![3; 8],
                        name: "call".into(),
                        kind: 3,
                        start_time_unix_nano: 1_700_000_000_000_000_000,
                        end_time_unix_nano: 1_700_000_000_100_000_000,
                        status: Some(Status {
                            message: "timeout".into(),
                            code: 2,
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let out = decode_trace_spans(&data).unwrap();
        let span = &out[0];
        assert_eq!(span.resource.service_name, "api");
        assert_eq!(span.kind, SpanKind::Client);
        assert_eq!(span.status.code, StatusCode::Error);
        assert_eq!(span.parent_span_id.as_ref().unwrap().as_str(), "0303030303030303");
        assert_eq!(span.end_time_unix_ms - span.start_time_unix_ms, 100.0);
    }

    #[test]
    fn missing_span_id_names_location() {
        let span = OtlpSpan {
            trace_id: vec![1; 16],
            ..Default::default()
        };
        let location = SpanLocation {
            resource: 2,
            scope: 1,
            span: 4,
        };
        let err = decode_span(location, &Resource::default(), &Scope::default(), &span)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "resourceSpans[2].scopeSpans[1].spans[4]: missing spanId"
        );
    }

    #[test]
    fn rejects_short_parent_id() {
        let span = OtlpSpan {
            trace_id: vec![1; 16],
            span_id: vec![2; 8],
            parent_span_id: vec![3; 3],
            ..Default::default()
        };
        let location = SpanLocation {
            resource: 0,
            scope: 0,
            span: 0,
        };
        let err = decode_span(location, &Resource::default(), &Scope::default(), &span)
            .unwrap_err();
        assert!(matches!(
            err,
            TraceParseError::InvalidField {
                field: "parentSpanId",
                ..
            }
        ));
    }

    #[test]
    fn missing_resource_defaults_service() {
        assert_eq!(decode_resource(None).service_name, "unknown");
    }

    #[test]
    fn groups_gauge_points_into_series() {
        let point = |ts: u64, v: f64, host: &str| NumberDataPoint {
            time_unix_nano: ts,
            attributes: vec![string_kv("host", host)],
            value: Some(number_data_point::Value::AsDouble(v)),
            ..Default::default()
        };
        let data = MetricsData {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(api_resource()),
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![Metric {
                        name: "cpu".into(),
                        data: Some(metric::Data::Gauge(Gauge {
                            data_points: vec![
                                point(2_000_000_000, 0.5, "a"),
                                point(1_000_000_000, 0.25, "a"),
                                point(1_000_000_000, 0.75, "b"),
                            ],
                        })),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let series = decode_metrics(&data);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "cpu{host=\"a\", service_name=\"api\"}");
        assert_eq!(series[0].values, vec![(1000, Some(0.25)), (2000, Some(0.5))]);
        assert_eq!(series[1].values, vec![(1000, Some(0.75))]);
    }
}
