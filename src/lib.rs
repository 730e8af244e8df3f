//! reqspan - request-scoped stage timing for multi-stage pipelines.
//!
//! reqspan measures how long each named stage of a request pipeline takes,
//! per individual request, safely under concurrent load. Measurements come
//! out as a structured report and can be embedded in the request's own
//! response payload. It is a pure measurement layer: it records, aggregates
//! and reports elapsed time per operation, and never decides what is slow or
//! alters control flow.
//!
//! # Architecture
//!
//! - `core`: domain models, errors, configuration
//! - `registry`: binds the active trace context to the executing thread
//! - `measure`: scoped regions and wrapped callables
//! - `report`: breakdown aggregation, console summary, JSON report
//! - `cli`: diagnostic command-line harness
//!
//! # Example
//!
//! ```
//! use reqspan_lib::{begin, end, measure, RequestId, TraceReport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = begin(RequestId::generate())?;
//!
//!     let _result: Result<&str, std::convert::Infallible> =
//!         measure::traced("query_transform", || Ok("transformed"));
//!
//!     let trace = end(handle)?;
//!     let report = TraceReport::from_trace(&trace);
//!     println!("{}", serde_json::to_string(&report)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod measure;
pub mod registry;
pub mod report;

// Re-export the programmatic surface consumed by pipeline collaborators
pub use crate::core::{
    Config, FinalizedTrace, MetaValue, Metadata, ReqspanError, RequestId, Result, Span, SpanStatus,
};
pub use crate::measure::{scope, traced, wrap, SpanGuard};
pub use crate::registry::{begin, current_request_id, end, is_active, ContextHandle};
pub use crate::report::{
    augment_response, log_if_slow, log_summary, render_summary, Breakdown, ReportOptions,
    TraceReport,
};
