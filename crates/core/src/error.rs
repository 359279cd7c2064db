use thiserror::Error;

use crate::model::span::SpanLocation;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(String),

    #[error(transparent)]
    Trace(#[from] TraceParseError),
}

pub type Result<T> = std::result::Result<T, PanelError>;

/// Reasons a trace payload cannot be turned into a [`crate::model::trace::Trace`].
///
/// Every span-level variant names where the span sits in the payload and,
/// once known, its id, so the message alone explains what to fix.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TraceParseError {
    #[error("failed to decode trace payload: {0}")]
    Decode(String),

    #[error("trace contains no spans")]
    Empty,

    #[error("{location}: missing {field}")]
    MissingField {
        location: SpanLocation,
        field: &'static str,
    },

    #[error("{location}: invalid {field}: {reason}")]
    InvalidField {
        location: SpanLocation,
        field: &'static str,
        reason: String,
    },

    #[error("span {span_id} at {location} ends before it starts (start={start_ms}ms end={end_ms}ms)")]
    EndBeforeStart {
        location: SpanLocation,
        span_id: String,
        start_ms: f64,
        end_ms: f64,
    },

    #[error("duplicate span id {span_id} at {location} (first seen at {first})")]
    DuplicateSpanId {
        span_id: String,
        location: SpanLocation,
        first: SpanLocation,
    },

    #[error("span {span_id} at {location} belongs to trace {found}, expected {expected}")]
    MixedTraceIds {
        span_id: String,
        location: SpanLocation,
        expected: String,
        found: String,
    },
}

impl TraceParseError {
    /// Payload location of the offending span, when the error is span-specific.
    pub fn location(&self) -> Option<SpanLocation> {
        match self {
            Self::Decode(_) | Self::Empty => None,
            Self::MissingField { location, .. }
            | Self::InvalidField { location, .. }
            | Self::EndBeforeStart { location, .. }
            | Self::DuplicateSpanId { location, .. }
            | Self::MixedTraceIds { location, .. } => Some(*location),
        }
    }
}
