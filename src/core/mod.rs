//! Core domain models for reqspan.
//!
//! This module contains the fundamental types shared by the registry,
//! measurement and reporting layers.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, LogLevel};
pub use error::{ReqspanError, Result};
pub use types::{FinalizedTrace, MetaValue, Metadata, RequestId, Span, SpanStatus};
