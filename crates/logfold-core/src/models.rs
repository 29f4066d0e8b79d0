//! Record model for the logfold wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// A structured log record, the unit sent and received by the server.
///
/// `source` labels the emitting process; `group` is a correlation key for
/// grouping related records. `recorded_at` is the sender-supplied instant;
/// `received_at` is stamped exactly once at ingest and is the authoritative
/// time for ordering within the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: Level,

    pub source: Option<String>,
    pub group: Option<String>,

    pub message: String,

    /// Key/value view of `message`, populated when the message parses as a
    /// JSON object.
    pub message_json: Option<serde_json::Map<String, serde_json::Value>>,

    pub recorded_at: DateTime<Utc>,

    /// Stamped at ingest; serialized as `created_at` on the wire.
    #[serde(rename = "created_at")]
    pub received_at: Option<DateTime<Utc>>,
}

impl LogRecord {
    /// Create a record with the given severity and message, recorded now.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            source: None,
            group: None,
            message: message.into(),
            message_json: None,
            recorded_at: Utc::now(),
            received_at: None,
        }
    }

    /// A record is empty when its message carries no content. Empty records
    /// are rejected at the ingest boundary.
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    /// Populate `message_json` when `message` parses as a JSON object.
    /// Non-object messages (arrays, scalars, plain text) leave it unset.
    pub fn derive_message_json(&mut self) {
        if self.message_json.is_some() {
            return;
        }
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&self.message) {
            self.message_json = Some(map);
        }
    }
}
