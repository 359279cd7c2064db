use std::borrow::Cow;
use std::io::Read;
use std::str::FromStr;

use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use otpanel_core::model::log::LogsData as LogFrame;
use otpanel_core::model::series::TimeSeriesData;
use otpanel_core::model::trace::Trace;
use otpanel_core::{PanelError, Result, TraceParseError};
use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::otlp::{decode, json};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    Protobuf,
    #[default]
    Auto,
}

impl PayloadFormat {
    /// Resolves `Auto` by looking at the first non-whitespace byte.
    pub fn resolve(self, bytes: &[u8]) -> Self {
        match self {
            Self::Auto => match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
                Some(b'{') | Some(b'[') => Self::Json,
                _ => Self::Protobuf,
            },
            other => other,
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "protobuf" | "proto" | "pb" => Ok(Self::Protobuf),
            "auto" => Ok(Self::Auto),
            other => Err(PanelError::InvalidArgument(format!(
                "unknown payload format: {other} (expected json, protobuf or auto)"
            ))),
        }
    }
}

/// Inflates gzip input, passes anything else through untouched.
pub fn maybe_decompress(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(bytes));
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| PanelError::Decode(format!("gzip: {e}")))?;
    debug!(compressed = bytes.len(), inflated = out.len(), "inflated gzip payload");
    Ok(Cow::Owned(out))
}

pub fn decode_traces(bytes: &[u8], format: PayloadFormat) -> std::result::Result<TracesData, TraceParseError> {
    let bytes = maybe_decompress(bytes).map_err(|e| TraceParseError::Decode(e.to_string()))?;
    match format.resolve(&bytes) {
        PayloadFormat::Protobuf => TracesData::decode(bytes.as_ref())
            .map_err(|e| TraceParseError::Decode(format!("protobuf: {e}"))),
        _ => json::parse_traces(&bytes),
    }
}

/// Decodes a payload and builds the span tree in one go.
pub fn build_trace(bytes: &[u8], format: PayloadFormat) -> std::result::Result<Trace, TraceParseError> {
    let data = decode_traces(bytes, format)?;
    let records = decode::decode_trace_spans(&data)?;
    Trace::build(records)
}

/// Logs are accepted either as OTLP protobuf or as JSON log frames, one
/// per query. Protobuf input becomes a single frame.
pub fn decode_logs(bytes: &[u8], format: PayloadFormat) -> Result<Vec<LogFrame>> {
    let bytes = maybe_decompress(bytes)?;
    match format.resolve(&bytes) {
        PayloadFormat::Protobuf => {
            let data = LogsData::decode(bytes.as_ref())
                .or_else(|_| {
                    ExportLogsServiceRequest::decode(bytes.as_ref()).map(|req| LogsData {
                        resource_logs: req.resource_logs,
                    })
                })
                .map_err(|e| PanelError::Decode(format!("protobuf logs: {e}")))?;
            let entries = decode::decode_logs(&data);
            Ok(vec![LogFrame {
                total_count: Some(entries.len()),
                entries,
            }])
        }
        _ => parse_one_or_many(&bytes),
    }
}

/// Metrics are accepted as OTLP protobuf or as JSON time series frames, one
/// per query. Protobuf input becomes a single frame.
pub fn decode_series(bytes: &[u8], format: PayloadFormat) -> Result<Vec<TimeSeriesData>> {
    let bytes = maybe_decompress(bytes)?;
    match format.resolve(&bytes) {
        PayloadFormat::Protobuf => {
            let data = MetricsData::decode(bytes.as_ref())
                .or_else(|_| {
                    ExportMetricsServiceRequest::decode(bytes.as_ref()).map(|req| MetricsData {
                        resource_metrics: req.resource_metrics,
                    })
                })
                .map_err(|e| PanelError::Decode(format!("protobuf metrics: {e}")))?;
            Ok(vec![TimeSeriesData {
                series: decode::decode_metrics(&data),
            }])
        }
        _ => parse_one_or_many(&bytes),
    }
}

/// JSON panel data comes as a single frame or an array of frames, one per
/// query.
pub fn parse_one_or_many<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    match serde_json::from_slice::<OneOrMany<T>>(bytes) {
        Ok(OneOrMany::Many(v)) => Ok(v),
        Ok(OneOrMany::One(v)) => Ok(vec![v]),
        Err(e) => Err(PanelError::Decode(format!("json: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn sample_json() -> &'static str {
        r#"{"resourceSpans":[{"resource":{"attributes":[{"key":"service.name","value":{"stringValue":"api"}}]},
            "scopeSpans":[{"spans":[
              {"traceId":"0102030405060708090a0b0c0d0e0f10","spanId":"0000000000000001","name":"root",
               "startTimeUnixNano":"1000000000","endTimeUnixNano":"2000000000"},
              {"traceId":"0102030405060708090a0b0c0d0e0f10","spanId":"0000000000000002","parentSpanId":"0000000000000001",
               "name":"child","startTimeUnixNano":"1100000000","endTimeUnixNano":"1500000000"}
            ]}]}]}"#
    }

    #[test]
    fn sniffs_json_and_protobuf() {
        assert_eq!(PayloadFormat::Auto.resolve(b"  {\"a\":1}"), PayloadFormat::Json);
        assert_eq!(PayloadFormat::Auto.resolve(&[0x0a, 0x01]), PayloadFormat::Protobuf);
        assert_eq!(PayloadFormat::Json.resolve(&[0x0a]), PayloadFormat::Json);
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("pb".parse::<PayloadFormat>().unwrap(), PayloadFormat::Protobuf);
        assert!("yaml".parse::<PayloadFormat>().is_err());
    }

    #[test]
    fn builds_trace_from_json() {
        let trace = build_trace(sample_json().as_bytes(), PayloadFormat::Auto).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.duration_ms(), 1000.0);
        assert_eq!(trace.root_span().unwrap().name, "root");
    }

    #[test]
    fn protobuf_round_trips_through_builder() {
        let data = json::parse_traces(sample_json().as_bytes()).unwrap();
        let bytes = data.encode_to_vec();
        let trace = build_trace(&bytes, PayloadFormat::Auto).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.roots().count(), 1);
    }

    #[test]
    fn inflates_gzip_payloads() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(sample_json().as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let trace = build_trace(&gz, PayloadFormat::Auto).unwrap();
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn truncated_gzip_is_decode_error() {
        let err = build_trace(&[0x1f, 0x8b, 0x08], PayloadFormat::Auto).unwrap_err();
        assert!(matches!(err, TraceParseError::Decode(_)));

        let err = decode_logs(&[0x1f, 0x8b, 0x08], PayloadFormat::Auto).unwrap_err();
        assert!(matches!(err, PanelError::Decode(ref msg) if msg.starts_with("gzip: ")), "{err}");
        assert!(matches!(maybe_decompress(b"{}"), Ok(Cow::Borrowed(_))));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = build_trace(br#"{"resourceSpans":[]}"#, PayloadFormat::Json).unwrap_err();
        assert_eq!(err, TraceParseError::Empty);
    }

    #[test]
    fn json_logs_accept_single_frame() {
        let body = br#"{"entries":[{"timestamp":1.5,"line":"hello","labels":{"level":"info"}}]}"#;
        let frames = decode_logs(body, PayloadFormat::Auto).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].entries[0].line, "hello");
    }

    #[test]
    fn json_series_accept_many_frames() {
        let body = br#"[{"series":[{"name":"a","values":[[1,2.0]]}]},{"series":[{"name":"b","values":[[1,null]]}]}]"#;
        let frames = decode_series(body, PayloadFormat::Json).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].series[0].values, vec![(1, None)]);
    }
}
