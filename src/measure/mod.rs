//! Scoped measurement API: the two public entry points for timing a region.
//!
//! Both entry points share one primitive: open a span named N, and on scope
//! exit (normal return, early return, error, or panic) close it exactly once,
//! recording duration and status, then append it to the thread's trace
//! context if one is bound. Outside an active context everything degrades to
//! a silent no-op; tracing must never crash the pipeline it measures.

use std::fmt;
use std::time::Instant;

use crate::core::{MetaValue, Metadata, Span, SpanStatus};
use crate::registry::{self, OpenSlot};

/// An open span, closed exactly once when the guard goes out of scope.
///
/// Durations are measured with a monotonic clock from guard creation to
/// drop. A panic unwinding through the guard closes the span as failed and
/// keeps unwinding; tracing is transparent to control flow.
#[derive(Debug)]
pub struct SpanGuard {
    name: String,
    start: Instant,
    slot: Option<OpenSlot>,
    metadata: Metadata,
    failure: Option<String>,
    closed: bool,
}

/// Opens a span named `name` in the current trace context.
pub fn scope<S: Into<String>>(name: S) -> SpanGuard {
    let slot = registry::open_slot();
    SpanGuard {
        name: name.into(),
        start: Instant::now(),
        slot,
        metadata: Metadata::new(),
        failure: None,
        closed: false,
    }
}

impl SpanGuard {
    /// Attaches metadata at open time, builder style.
    pub fn with_meta<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<MetaValue>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Records metadata before close. Later keys overwrite earlier ones.
    pub fn record<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<MetaValue>,
    {
        self.metadata.insert(key.into(), value.into());
    }

    /// Marks the span as failed with the given detail.
    pub fn fail<S: Into<String>>(&mut self, detail: S) {
        self.failure = Some(detail.into());
    }

    /// Returns the operation name this guard measures.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let duration = self.start.elapsed();

        if let Some(slot) = self.slot {
            let status = match self.failure.take() {
                Some(detail) => SpanStatus::Failed(detail),
                None if std::thread::panicking() => SpanStatus::failed("panicked"),
                None => SpanStatus::Ok,
            };
            let span = Span {
                name: std::mem::take(&mut self.name),
                start_offset: slot.start_offset,
                duration,
                status,
                metadata: std::mem::take(&mut self.metadata),
            };
            registry::fill_slot(slot, span);
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Runs `f` inside a span named `name`.
///
/// An `Err` closes the span as failed with the error text as detail and is
/// returned to the caller unchanged; an `Ok` closes it as ok. The callable's
/// return and error contract is preserved exactly.
pub fn traced<T, E, F>(name: impl Into<String>, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: fmt::Display,
{
    let mut guard = scope(name);
    let result = f();
    if let Err(e) = &result {
        guard.fail(e.to_string());
    }
    result
}

/// Wraps a callable so every invocation is bracketed by a span named `name`.
///
/// The returned callable has the identical argument, return and error
/// behavior as `f`; additional state can be captured by the closure.
pub fn wrap<A, T, E, F>(name: impl Into<String>, mut f: F) -> impl FnMut(A) -> Result<T, E>
where
    F: FnMut(A) -> Result<T, E>,
    E: fmt::Display,
{
    let name = name.into();
    move |arg: A| traced(name.clone(), || f(arg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RequestId;
    use crate::registry;

    fn rid(s: &str) -> RequestId {
        RequestId::new(s.to_string()).unwrap()
    }

    #[test]
    fn test_scope_records_span() {
        let handle = registry::begin(rid("req_scope")).unwrap();
        {
            let mut guard = scope("query_transform").with_meta("model", "gpt-4o-mini");
            guard.record("tokens", 42i64);
        }
        let trace = registry::end(handle).unwrap();

        assert_eq!(trace.span_count(), 1);
        let span = &trace.spans[0];
        assert_eq!(span.name, "query_transform");
        assert!(span.status.is_ok());
        assert_eq!(span.get_meta("model"), Some(&"gpt-4o-mini".into()));
        assert_eq!(span.get_meta("tokens"), Some(&42i64.into()));
    }

    #[test]
    fn test_metadata_later_keys_win() {
        let handle = registry::begin(rid("req_meta")).unwrap();
        {
            let mut guard = scope("stage").with_meta("size", 10i64);
            guard.record("size", 20i64);
        }
        let trace = registry::end(handle).unwrap();
        assert_eq!(trace.spans[0].get_meta("size"), Some(&20i64.into()));
    }

    #[test]
    fn test_fail_marks_span() {
        let handle = registry::begin(rid("req_fail")).unwrap();
        {
            let mut guard = scope("search_backend");
            guard.fail("connection refused");
        }
        let trace = registry::end(handle).unwrap();
        assert_eq!(
            trace.spans[0].status.failure_message(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_traced_propagates_error_unchanged() {
        #[derive(Debug, PartialEq)]
        struct DomainError(&'static str);
        impl fmt::Display for DomainError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "domain error: {}", self.0)
            }
        }

        let handle = registry::begin(rid("req_traced")).unwrap();
        let result: Result<(), DomainError> =
            traced("search_backend", || Err(DomainError("index missing")));
        assert_eq!(result.unwrap_err(), DomainError("index missing"));

        let trace = registry::end(handle).unwrap();
        assert_eq!(trace.span_count(), 1);
        assert_eq!(
            trace.spans[0].status.failure_message(),
            Some("domain error: index missing")
        );
    }

    #[test]
    fn test_traced_ok_passthrough() {
        let handle = registry::begin(rid("req_ok")).unwrap();
        let result: Result<u32, std::convert::Infallible> = traced("format_results", || Ok(7));
        assert_eq!(result.unwrap(), 7);

        let trace = registry::end(handle).unwrap();
        assert!(trace.spans[0].status.is_ok());
    }

    #[test]
    fn test_wrap_preserves_contract() {
        let handle = registry::begin(rid("req_wrap")).unwrap();
        let mut transform = wrap("query_transform", |q: &str| -> Result<String, String> {
            Ok(q.to_uppercase())
        });

        assert_eq!(transform("banks").unwrap(), "BANKS");
        assert_eq!(transform("tech").unwrap(), "TECH");

        let trace = registry::end(handle).unwrap();
        assert_eq!(trace.span_count(), 2);
        assert!(trace.spans.iter().all(|s| s.name == "query_transform"));
    }

    #[test]
    fn test_panic_closes_span_as_failed() {
        let handle = registry::begin(rid("req_panic")).unwrap();
        let result = std::panic::catch_unwind(|| {
            let _guard = scope("stage_panics");
            panic!("stage blew up");
        });
        assert!(result.is_err());

        let trace = registry::end(handle).unwrap();
        assert_eq!(trace.span_count(), 1);
        assert_eq!(trace.spans[0].status.failure_message(), Some("panicked"));
    }

    #[test]
    fn test_no_context_is_silent_noop() {
        assert!(!registry::is_active());
        let mut guard = scope("orphan");
        guard.record("ignored", true);
        drop(guard);

        let result: Result<u32, String> = traced("orphan_traced", || Ok(1));
        assert_eq!(result.unwrap(), 1);
        assert!(!registry::is_active());
    }
}
