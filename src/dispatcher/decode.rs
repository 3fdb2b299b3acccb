// Decoding of live-channel payloads into MetricRecords.
// Wire shape is the monitor's record row as JSON (snake_case, numeric ids, text timestamps),
// optionally behind the legacy "New Project: " tag.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::MetricRecord;

/// Tag the monitor's notifier puts in front of each JSON payload.
pub const LEGACY_PREFIX: &str = "New Project: ";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Identifier that the monitor may emit as a number (SQLite rowid) or as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Int(i64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Int(i) => i.to_string(),
            WireId::Text(s) => s,
        }
    }
}

/// Timestamp as epoch milliseconds or as text (RFC 3339, SQLite datetime, or digits).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

/// One record as it travels on the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRecord {
    pub id: WireId,
    pub run_id: WireId,
    pub pid: i64,
    pub timestamp: WireTimestamp,
    pub cpu_usage: f64,
    pub cpu_energy: f64,
    pub gpu_usage: f64,
    pub gpu_energy: f64,
    pub mem_usage: f64,
    pub mem_energy: f64,
    pub igpu_usage: f64,
    pub igpu_energy: f64,
}

impl From<&MetricRecord> for WireRecord {
    fn from(r: &MetricRecord) -> Self {
        WireRecord {
            id: WireId::Text(r.id.clone()),
            run_id: WireId::Text(r.run_id.clone()),
            pid: r.process_id,
            timestamp: WireTimestamp::Millis(r.timestamp),
            cpu_usage: r.cpu_usage,
            cpu_energy: r.cpu_energy,
            gpu_usage: r.gpu_usage,
            gpu_energy: r.gpu_energy,
            mem_usage: r.mem_usage,
            mem_energy: r.mem_energy,
            igpu_usage: r.igpu_usage,
            igpu_energy: r.igpu_energy,
        }
    }
}

impl TryFrom<WireRecord> for MetricRecord {
    type Error = DecodeError;

    fn try_from(w: WireRecord) -> Result<Self, Self::Error> {
        let timestamp = match w.timestamp {
            WireTimestamp::Millis(ms) => ms,
            WireTimestamp::Text(s) => parse_timestamp_ms(&s)?,
        };
        for (field, value) in [
            ("cpu_usage", w.cpu_usage),
            ("gpu_usage", w.gpu_usage),
            ("mem_usage", w.mem_usage),
            ("igpu_usage", w.igpu_usage),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(DecodeError::OutOfRange { field, value });
            }
        }
        for (field, value) in [
            ("cpu_energy", w.cpu_energy),
            ("gpu_energy", w.gpu_energy),
            ("mem_energy", w.mem_energy),
            ("igpu_energy", w.igpu_energy),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DecodeError::OutOfRange { field, value });
            }
        }
        Ok(MetricRecord {
            id: w.id.into_string(),
            run_id: w.run_id.into_string(),
            process_id: w.pid,
            timestamp,
            cpu_usage: w.cpu_usage,
            cpu_energy: w.cpu_energy,
            gpu_usage: w.gpu_usage,
            gpu_energy: w.gpu_energy,
            mem_usage: w.mem_usage,
            mem_energy: w.mem_energy,
            igpu_usage: w.igpu_usage,
            igpu_energy: w.igpu_energy,
        })
    }
}

/// Decodes one channel message. Leading/trailing whitespace and the legacy tag are ignored.
pub fn decode_message(payload: &str) -> Result<MetricRecord, DecodeError> {
    let trimmed = payload.trim();
    let json = trimmed.strip_prefix(LEGACY_PREFIX).unwrap_or(trimmed);
    let wire: WireRecord =
        serde_json::from_str(json).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    MetricRecord::try_from(wire)
}

/// Encodes a record in the channel wire format (no legacy tag).
pub fn encode_record(record: &MetricRecord) -> serde_json::Result<String> {
    serde_json::to_string(&WireRecord::from(record))
}

/// Parses epoch-ms digits, RFC 3339, or SQLite `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC).
pub fn parse_timestamp_ms(s: &str) -> Result<i64, DecodeError> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    Err(DecodeError::Timestamp(s.to_string()))
}
