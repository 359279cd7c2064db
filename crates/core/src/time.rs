use chrono::{DateTime, Utc};

use crate::error::{PanelError, Result};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Converts OTLP nanosecond timestamps to fractional unix milliseconds.
pub fn nanos_to_ms(nanos: u64) -> f64 {
    (nanos / NANOS_PER_MILLI) as f64 + (nanos % NANOS_PER_MILLI) as f64 / NANOS_PER_MILLI as f64
}

pub fn ms_to_datetime(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_micros((ms * 1000.0).round() as i64)
}

/// Human duration used across span rows, event lists and tooltips:
/// microseconds below 1ms, milliseconds below 1s, seconds above,
/// with at most two decimals. The unit is picked after rounding.
pub fn format_duration(ms: f64) -> String {
    if ms < 0.0 {
        return format!("-{}", format_duration(-ms));
    }
    let micros = (ms * 1000.0).round();
    if micros < 1000.0 {
        return format!("{micros}μs");
    }
    let millis = round2(ms);
    if millis < 1000.0 {
        return format!("{millis}ms");
    }
    format!("{}s", round2(ms / 1000.0))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|e| PanelError::Parse(format!("failed to parse duration to chrono: {e}")))?;
        return Utc::now()
            .checked_sub_signed(duration)
            .ok_or_else(|| {
                PanelError::Parse(format!("duration {input} reaches before the earliest time"))
            });
    }

    Err(PanelError::Parse(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_nanos() {
        assert_eq!(nanos_to_ms(1_700_000_000_150_000_000), 1_700_000_000_150.0);
        assert_eq!(nanos_to_ms(1_500_000), 1.5);
        assert_eq!(nanos_to_ms(0), 0.0);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(150.0), "150ms");
        assert_eq!(format_duration(0.25), "250μs");
        assert_eq!(format_duration(12.3456), "12.35ms");
        assert_eq!(format_duration(1500.0), "1.5s");
        assert_eq!(format_duration(61_000.0), "61s");
        assert_eq!(format_duration(-20.0), "-20ms");
        assert_eq!(format_duration(0.9996), "1ms");
        assert_eq!(format_duration(999.996), "1s");
        assert_eq!(format_duration(0.9994), "999μs");
    }

    #[test]
    fn converts_ms_to_datetime() {
        let ts = ms_to_datetime(1_767_225_600_000.0).unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert!(ms_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn parses_rfc3339() {
        let ts = parse_time_or_relative("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn parses_duration() {
        let now = Utc::now();
        let ts = parse_time_or_relative("5m").unwrap();
        assert!(ts < now);
    }

    #[test]
    fn rejects_invalid() {
        assert!(parse_time_or_relative("nope").is_err());
        assert!(parse_time_or_relative("").is_err());
        assert!(matches!(
            parse_time_or_relative("1000000years"),
            Err(PanelError::Parse(_))
        ));
    }
}
