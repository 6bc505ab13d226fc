//! Log records as pushed by the log service
//!
//! The service forwards journald JSON with every field optional. Values are
//! coerced rather than validated: journald sends a MESSAGE holding control
//! characters as a byte array, and numeric fields may arrive as numbers.
//! Only frames that are not JSON objects are rejected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{LogStreamError, Result};

/// journald "informational"
pub const DEFAULT_PRIORITY: u8 = 6;
/// journald "debug", the highest valid priority value
pub const MAX_PRIORITY: u8 = 7;

/// A buffered log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Client-assigned, strictly increasing for the client's lifetime
    pub id: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub pid: String,
}

/// A parsed record that has not been given an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub pid: String,
}

impl LogRecord {
    pub fn into_entry(self, id: u64) -> LogEntry {
        LogEntry {
            id,
            message: self.message,
            timestamp: self.timestamp,
            priority: self.priority,
            pid: self.pid,
        }
    }
}

/// One inbound text frame, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Record(LogRecord),
    /// `{"error": "..."}` sent when the service could not start the tail
    ServerError(String),
}

const MESSAGE: &str = "MESSAGE";
const REALTIME_TIMESTAMP: &str = "__REALTIME_TIMESTAMP";
const PRIORITY: &str = "PRIORITY";
const PID: &str = "_PID";

/// Classify a text frame. Anything that is not a JSON object is an
/// `InvalidRecord` error; callers drop those.
pub fn parse_frame(text: &str) -> Result<InboundFrame> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LogStreamError::InvalidRecord(e.to_string()))?;

    let Value::Object(fields) = value else {
        return Err(LogStreamError::InvalidRecord("not a JSON object".to_string()));
    };

    if !fields.contains_key(MESSAGE) {
        if let Some(Value::String(error)) = fields.get("error") {
            return Ok(InboundFrame::ServerError(error.clone()));
        }
    }

    Ok(InboundFrame::Record(LogRecord {
        message: fields.get(MESSAGE).map(text_of).unwrap_or_default(),
        timestamp: fields
            .get(REALTIME_TIMESTAMP)
            .and_then(integer_of)
            .and_then(|micros| DateTime::from_timestamp_millis(micros / 1000))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        priority: fields
            .get(PRIORITY)
            .and_then(integer_of)
            .and_then(|p| u8::try_from(p).ok())
            .filter(|p| *p <= MAX_PRIORITY)
            .unwrap_or(DEFAULT_PRIORITY),
        pid: fields.get(PID).map(text_of).unwrap_or_default(),
    }))
}

/// Render a field as text. Byte arrays are decoded as lossy UTF-8.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(parts) => {
            let bytes: Option<Vec<u8>> = parts
                .iter()
                .map(|part| part.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            match bytes {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => value.to_string(),
            }
        }
        other => other.to_string(),
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}
