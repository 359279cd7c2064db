use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

const TRACE_ID_LEN: usize = 16;
const SPAN_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanId(String);

impl TraceId {
    /// Accepts the hex form used by OTLP/JSON or the base64 form some
    /// backends emit instead.
    pub fn parse(input: &str) -> Result<Self> {
        parse_id(input, TRACE_ID_LEN, "trace id").map(Self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        id_from_bytes(bytes, TRACE_ID_LEN, "trace id").map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        hex_to_bytes(&self.0)
    }
}

impl SpanId {
    pub fn parse(input: &str) -> Result<Self> {
        parse_id(input, SPAN_ID_LEN, "span id").map(Self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        id_from_bytes(bytes, SPAN_ID_LEN, "span id").map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        hex_to_bytes(&self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_id(input: &str, len: usize, what: &str) -> Result<String> {
    let input = input.trim();
    if input.len() == len * 2 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        let hex = input.to_ascii_lowercase();
        if hex.chars().all(|c| c == '0') {
            return Err(PanelError::Parse(format!("{what} is all zeroes")));
        }
        return Ok(hex);
    }

    let bytes = STANDARD
        .decode(input)
        .map_err(|_| PanelError::Parse(format!("invalid {what}: {input}")))?;
    id_from_bytes(&bytes, len, what)
}

fn id_from_bytes(bytes: &[u8], len: usize, what: &str) -> Result<String> {
    if bytes.len() != len {
        return Err(PanelError::Parse(format!(
            "invalid {what}: expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|b| *b == 0) {
        return Err(PanelError::Parse(format!("{what} is all zeroes")));
    }
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

// Only called on ids this module produced, which are always valid hex.
fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
