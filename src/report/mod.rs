//! Aggregation and reporting for finalized traces.
//!
//! Turns a [`FinalizedTrace`] into a per-operation breakdown and renders it
//! two ways: a fixed-width console summary for command-line diagnostics, and
//! a JSON-serializable report suitable for embedding in an API response or a
//! log line.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt::Write as _;
use std::time::Duration;

use crate::core::config::ReportConfig;
use crate::core::types::round2;
use crate::core::{FinalizedTrace, ReqspanError, Result};

/// Aggregated timing for one distinct operation name.
#[derive(Debug, Clone)]
pub struct OperationStats {
    /// Operation name shared by the summed spans.
    pub operation: String,
    /// Total duration across all spans with this name.
    pub duration: Duration,
    /// Share of the trace's total duration, in percent. Zero when the trace
    /// total is zero.
    pub percent: f64,
}

impl OperationStats {
    /// Returns the summed duration in fractional milliseconds.
    pub fn duration_ms(&self) -> f64 {
        round2(self.duration.as_secs_f64() * 1000.0)
    }
}

/// Per-operation breakdown of one finalized trace.
///
/// Entries are ordered descending by duration; operations with equal
/// durations keep their first-occurrence order. Because spans may nest, the
/// summed durations can legitimately exceed the trace total and percentages
/// can sum past 100.
#[derive(Debug, Clone)]
pub struct Breakdown {
    entries: Vec<OperationStats>,
}

impl Breakdown {
    /// Computes the breakdown for a finalized trace.
    pub fn compute(trace: &FinalizedTrace) -> Self {
        let total = trace.total_duration.as_secs_f64();
        let mut entries: Vec<OperationStats> = Vec::new();

        for span in &trace.spans {
            match entries.iter_mut().find(|e| e.operation == span.name) {
                Some(entry) => entry.duration += span.duration,
                None => entries.push(OperationStats {
                    operation: span.name.clone(),
                    duration: span.duration,
                    percent: 0.0,
                }),
            }
        }

        for entry in &mut entries {
            entry.percent = if total > 0.0 {
                entry.duration.as_secs_f64() / total * 100.0
            } else {
                0.0
            };
        }

        // Stable sort keeps first-occurrence order for equal durations.
        entries.sort_by(|a, b| b.duration.cmp(&a.duration));
        Breakdown { entries }
    }

    /// Returns the entries, descending by duration.
    pub fn entries(&self) -> &[OperationStats] {
        &self.entries
    }

    /// Looks up the stats for an operation name.
    pub fn get(&self, operation: &str) -> Option<&OperationStats> {
        self.entries.iter().find(|e| e.operation == operation)
    }

    /// Returns the number of distinct operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the trace recorded no spans.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// JSON-serializable performance report for one request.
///
/// Shape: `{request_id, total_duration_ms, breakdown: {operation:
/// {duration_ms, percent}}}`. The breakdown map is emitted in the same
/// descending-duration order as the console table so reports are
/// deterministic.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    /// Identifier of the reported request.
    pub request_id: String,
    /// Total request duration in fractional milliseconds.
    pub total_duration_ms: f64,
    /// Per-operation aggregated durations and percentages.
    #[serde(serialize_with = "serialize_breakdown")]
    pub breakdown: Vec<OperationStats>,
}

#[derive(Serialize)]
struct BreakdownValue {
    duration_ms: f64,
    percent: f64,
}

fn serialize_breakdown<S: Serializer>(
    entries: &[OperationStats],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for entry in entries {
        map.serialize_entry(
            &entry.operation,
            &BreakdownValue {
                duration_ms: entry.duration_ms(),
                percent: round2(entry.percent),
            },
        )?;
    }
    map.end()
}

impl TraceReport {
    /// Builds the report for a finalized trace.
    pub fn from_trace(trace: &FinalizedTrace) -> Self {
        TraceReport {
            request_id: trace.request_id.as_str().to_string(),
            total_duration_ms: trace.total_duration_ms(),
            breakdown: Breakdown::compute(trace).entries,
        }
    }

    /// Returns the report as a JSON value for embedding.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Attaches a report under the `performance` key of a JSON object response.
pub fn augment_response(payload: &mut serde_json::Value, report: &TraceReport) -> Result<()> {
    match payload.as_object_mut() {
        Some(obj) => {
            obj.insert("performance".to_string(), report.to_value()?);
            Ok(())
        },
        None => Err(ReqspanError::invalid_payload(format!(
            "cannot attach performance data to {}",
            json_kind(payload)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Console rendering options.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Width of the operation column.
    pub operation_width: usize,
    /// Include span metadata in the chronological detail listing.
    pub include_metadata: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            operation_width: 30,
            include_metadata: true,
        }
    }
}

impl From<&ReportConfig> for ReportOptions {
    fn from(config: &ReportConfig) -> Self {
        ReportOptions {
            operation_width: config.operation_width,
            include_metadata: config.include_metadata,
        }
    }
}

/// Renders the fixed-width console summary for a finalized trace.
///
/// A ranked table (operation, duration, percentage) sorted descending by
/// duration, followed by a chronological listing of every span with its
/// duration and metadata.
pub fn render_summary(trace: &FinalizedTrace, options: &ReportOptions) -> String {
    let breakdown = Breakdown::compute(trace);
    let w = options.operation_width;
    let rule = "=".repeat(w + 30);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "PERFORMANCE TRACE SUMMARY - Request {}", trace.request_id);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Total Duration: {:.2}ms", trace.total_duration_ms());
    let _ = writeln!(out);
    let _ = writeln!(out, "Breakdown by Operation:");
    let _ = writeln!(out, "{:<w$} {:<15} {:<10}", "Operation", "Duration (ms)", "%");
    let _ = writeln!(out, "{}", "-".repeat(w + 25));
    for entry in breakdown.entries() {
        let _ = writeln!(
            out,
            "{:<w$} {:<15.2} {:<9.1}%",
            entry.operation,
            entry.duration_ms(),
            entry.percent,
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Detailed Timeline:");
    for span in &trace.spans {
        let mut line = format!("  {}: {:.2}ms", span.name, span.duration_ms());
        if let Some(detail) = span.status.failure_message() {
            let _ = write!(line, " [failed: {}]", detail);
        }
        if options.include_metadata && !span.metadata.is_empty() {
            let meta = serde_json::to_string(&span.metadata).unwrap_or_default();
            let _ = write!(line, " | {}", meta);
        }
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "{}", rule);

    out
}

/// Logs the report as an info-level JSON line.
pub fn log_summary(trace: &FinalizedTrace) {
    let report = TraceReport::from_trace(trace);
    let payload =
        serde_json::to_string(&report).unwrap_or_else(|_| format!("{:?}", report));
    tracing::info!(
        request_id = %trace.request_id,
        total_duration_ms = trace.total_duration_ms(),
        %payload,
        "performance summary"
    );
}

/// Severity-gated hook: logs the report at warn level only when the request
/// exceeded `threshold`. Returns whether the hook fired.
pub fn log_if_slow(trace: &FinalizedTrace, threshold: Duration) -> bool {
    if !trace.exceeds(threshold) {
        return false;
    }
    let report = TraceReport::from_trace(trace);
    let payload =
        serde_json::to_string(&report).unwrap_or_else(|_| format!("{:?}", report));
    tracing::warn!(
        request_id = %trace.request_id,
        total_duration_ms = trace.total_duration_ms(),
        threshold_ms = round2(threshold.as_secs_f64() * 1000.0),
        %payload,
        "slow request"
    );
    true
}
