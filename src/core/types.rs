use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::core::error::{ReqspanError, Result};

/// Unique identifier for a traced request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a new RequestId after validation.
    pub fn new(id: String) -> Result<Self> {
        if id.is_empty() {
            return Err(ReqspanError::InvalidRequestId(
                "request id cannot be empty".to_string(),
            ));
        }
        if id.len() > 64 {
            return Err(ReqspanError::InvalidRequestId(format!(
                "request id cannot exceed 64 characters, got {}",
                id.len()
            )));
        }
        Ok(RequestId(id))
    }

    /// Generates a fresh request id for callers that do not supply one.
    pub fn generate() -> Self {
        RequestId(format!("req_{:016x}", fastrand::u64(..)))
    }

    /// Returns the string representation of the request id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A metadata value attached to a span.
///
/// Restricted to primitives so serialized reports stay well-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// String value
    Str(String),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Bool(bool),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Str(s) => write!(f, "{}", s),
            MetaValue::Int(i) => write!(f, "{}", i),
            MetaValue::Float(x) => write!(f, "{}", x),
            MetaValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v.into())
    }
}

impl From<u32> for MetaValue {
    fn from(v: u32) -> Self {
        MetaValue::Int(v.into())
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Span metadata map. Later inserts overwrite earlier ones with the same key.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Status of a closed span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// The measured region completed normally.
    Ok,
    /// The measured region raised an error.
    Failed(String),
}

impl SpanStatus {
    /// Creates a failed status with the given detail.
    pub fn failed<S: Into<String>>(detail: S) -> Self {
        SpanStatus::Failed(detail.into())
    }

    /// Returns true if the span completed successfully.
    pub fn is_ok(&self) -> bool {
        matches!(self, SpanStatus::Ok)
    }

    /// Returns true if the span recorded a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, SpanStatus::Failed(_))
    }

    /// Returns the failure detail if this is a failed status.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            SpanStatus::Failed(msg) => Some(msg),
            SpanStatus::Ok => None,
        }
    }
}

/// Serde adapter rendering a `Duration` as fractional milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_f64(super::round2(d.as_secs_f64() * 1000.0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "duration must be a non-negative number of milliseconds, got {}",
                ms
            )));
        }
        Ok(Duration::from_secs_f64(ms / 1000.0))
    }
}

/// Rounds to two decimal places for millisecond reporting.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// A single named, timed unit of work, immutable once closed.
///
/// Open spans live inside the measurement guard; this type only ever
/// represents the closed record appended to the owning trace context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Name of the operation this span measured.
    pub name: String,
    /// Monotonic offset from the start of the owning trace context.
    #[serde(rename = "start_offset_ms", with = "duration_ms")]
    pub start_offset: Duration,
    /// Elapsed time between open and close.
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    /// Outcome of the measured region.
    pub status: SpanStatus,
    /// Diagnostic key-value context attached before close.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Span {
    /// Returns the duration in fractional milliseconds.
    pub fn duration_ms(&self) -> f64 {
        round2(self.duration.as_secs_f64() * 1000.0)
    }

    /// Returns the start offset in fractional milliseconds.
    pub fn start_offset_ms(&self) -> f64 {
        round2(self.start_offset.as_secs_f64() * 1000.0)
    }

    /// Gets a metadata value by key.
    pub fn get_meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }
}

/// An immutable, sealed trace for one completed request.
///
/// Produced exactly once by ending a trace context. Spans appear in the
/// order they were opened, regardless of when they closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedTrace {
    /// Identifier of the request this trace belongs to.
    pub request_id: RequestId,
    /// Wall-clock time the trace context was created.
    pub started_at: DateTime<Utc>,
    /// Elapsed time between context creation and finalization.
    #[serde(rename = "total_duration_ms", with = "duration_ms")]
    pub total_duration: Duration,
    /// Closed spans in open order.
    pub spans: Vec<Span>,
}

impl FinalizedTrace {
    /// Returns the total request duration in fractional milliseconds.
    pub fn total_duration_ms(&self) -> f64 {
        round2(self.total_duration.as_secs_f64() * 1000.0)
    }

    /// Returns the number of recorded spans.
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if any span recorded a failure.
    pub fn has_failures(&self) -> bool {
        self.spans.iter().any(|s| s.status.is_failed())
    }

    /// Returns true if the request took longer than the given threshold.
    pub fn exceeds(&self, threshold: Duration) -> bool {
        self.total_duration > threshold
    }
}
