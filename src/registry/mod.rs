//! Context registry: binds a trace context to the executing thread.
//!
//! Each OS thread owns at most one active trace context. The binding table
//! is partitioned per thread (`thread_local!`), so concurrent requests never
//! observe or lock each other's state. Deeply nested pipeline code reaches
//! its own context through the measurement API without threading a handle
//! through every call.
//!
//! Every `begin` stamps the context with a process-unique token. Measurement
//! guards and `ContextHandle`s carry that token, so a stale guard or a handle
//! from a previous binding can never touch a newer context.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::{FinalizedTrace, ReqspanError, RequestId, Result, Span};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// The trace context for one in-flight request, owned by its thread.
struct TraceContext {
    request_id: RequestId,
    token: u64,
    started_at: DateTime<Utc>,
    epoch: Instant,
    /// One slot per opened span, in open order. A slot stays `None` until
    /// its span closes, so nested spans keep their open position.
    slots: Vec<Option<Span>>,
}

thread_local! {
    static ACTIVE: RefCell<Option<TraceContext>> = const { RefCell::new(None) };
}

/// Proof of an active trace context, required to end it.
///
/// Not `Clone`: `end` consumes the handle, so ending the same request twice
/// does not compile. Dropping the handle without `end` discards the context
/// and logs a leak warning.
#[derive(Debug)]
pub struct ContextHandle {
    request_id: RequestId,
    token: u64,
    finished: bool,
}

impl ContextHandle {
    /// Returns the request id this handle belongs to.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        ACTIVE.with(|cell| {
            let mut slot = cell.borrow_mut();
            let owns_binding = slot.as_ref().map_or(false, |ctx| ctx.token == self.token);
            if owns_binding {
                let ctx = slot.take().expect("binding checked above");
                tracing::warn!(
                    request_id = %ctx.request_id,
                    spans = ctx.slots.len(),
                    "trace context dropped without end; measurements discarded"
                );
            }
        });
    }
}

/// Creates a new trace context and binds it as current for this thread.
///
/// Fails if this thread already has an unfinished context; that is a
/// programming error in the caller, not a runtime condition.
pub fn begin(request_id: RequestId) -> Result<ContextHandle> {
    ACTIVE.with(|cell| {
        let mut slot = cell.borrow_mut();
        if let Some(ctx) = slot.as_ref() {
            return Err(ReqspanError::ContextAlreadyActive {
                current: ctx.request_id.clone(),
                requested: request_id,
            });
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        *slot = Some(TraceContext {
            request_id: request_id.clone(),
            token,
            started_at: Utc::now(),
            epoch: Instant::now(),
            slots: Vec::new(),
        });
        Ok(ContextHandle {
            request_id,
            token,
            finished: false,
        })
    })
}

/// Returns the request id bound to this thread, if any.
pub fn current_request_id() -> Option<RequestId> {
    ACTIVE.with(|cell| cell.borrow().as_ref().map(|ctx| ctx.request_id.clone()))
}

/// Returns true if this thread has an active trace context.
pub fn is_active() -> bool {
    ACTIVE.with(|cell| cell.borrow().is_some())
}

/// Unbinds and seals the context, returning the immutable trace.
///
/// Consumes the handle, so a second `end` for the same request cannot be
/// written. Returns a usage error when the handle does not match this
/// thread's binding (ended on the wrong thread, or nothing is bound).
pub fn end(mut handle: ContextHandle) -> Result<FinalizedTrace> {
    handle.finished = true;
    ACTIVE.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_ref() {
            None => Err(ReqspanError::NoActiveContext(handle.request_id.clone())),
            Some(ctx) if ctx.token != handle.token => Err(ReqspanError::HandleMismatch {
                handle: handle.request_id.clone(),
                active: ctx.request_id.clone(),
            }),
            Some(_) => {
                let ctx = slot.take().expect("binding checked above");
                Ok(finalize(ctx))
            },
        }
    })
}

fn finalize(ctx: TraceContext) -> FinalizedTrace {
    let total_duration = ctx.epoch.elapsed();
    let open_count = ctx.slots.iter().filter(|s| s.is_none()).count();
    if open_count > 0 {
        tracing::debug!(
            request_id = %ctx.request_id,
            open_count,
            "spans still open at finalize; discarding them"
        );
    }
    FinalizedTrace {
        request_id: ctx.request_id,
        started_at: ctx.started_at,
        total_duration,
        spans: ctx.slots.into_iter().flatten().collect(),
    }
}

/// Position reserved for an opened span in the current context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenSlot {
    pub token: u64,
    pub index: usize,
    pub start_offset: Duration,
}

/// Reserves a span slot in open order. Returns `None` when no context is
/// bound; the measurement layer treats that as a silent no-op.
pub(crate) fn open_slot() -> Option<OpenSlot> {
    ACTIVE.with(|cell| {
        let mut slot = cell.borrow_mut();
        let ctx = slot.as_mut()?;
        ctx.slots.push(None);
        Some(OpenSlot {
            token: ctx.token,
            index: ctx.slots.len() - 1,
            start_offset: ctx.epoch.elapsed(),
        })
    })
}

/// Fills a previously reserved slot with its closed span. Silently discards
/// the span when the binding changed since the slot was reserved.
pub(crate) fn fill_slot(open: OpenSlot, span: Span) {
    ACTIVE.with(|cell| {
        let mut slot = cell.borrow_mut();
        if let Some(ctx) = slot.as_mut() {
            if ctx.token == open.token {
                if let Some(entry) = ctx.slots.get_mut(open.index) {
                    *entry = Some(span);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SpanStatus;

    fn rid(s: &str) -> RequestId {
        RequestId::new(s.to_string()).unwrap()
    }

    #[test]
    fn test_begin_end_lifecycle() {
        let handle = begin(rid("req_life")).unwrap();
        assert!(is_active());
        assert_eq!(current_request_id(), Some(rid("req_life")));

        let trace = end(handle).unwrap();
        assert!(!is_active());
        assert_eq!(trace.request_id, rid("req_life"));
        assert_eq!(trace.span_count(), 0);
    }

    #[test]
    fn test_double_begin_is_usage_error() {
        let handle = begin(rid("req_first")).unwrap();
        let err = begin(rid("req_second")).unwrap_err();
        assert!(matches!(err, ReqspanError::ContextAlreadyActive { .. }));
        end(handle).unwrap();
    }

    #[test]
    fn test_end_on_wrong_thread() {
        let handle = begin(rid("req_home")).unwrap();
        let err = std::thread::spawn(move || end(handle).unwrap_err())
            .join()
            .unwrap();
        assert!(matches!(err, ReqspanError::NoActiveContext(_)));

        // The home thread's binding is gone with the handle; rebinding works
        // after the leaked entry is cleared.
        ACTIVE.with(|cell| *cell.borrow_mut() = None);
    }

    #[test]
    fn test_handle_mismatch_against_foreign_context() {
        let foreign = begin(rid("req_foreign")).unwrap();
        let handle = std::thread::spawn(|| begin(rid("req_away")).unwrap())
            .join()
            .unwrap();

        let err = end(handle).unwrap_err();
        assert!(matches!(err, ReqspanError::HandleMismatch { .. }));
        end(foreign).unwrap();
    }

    #[test]
    fn test_dropped_handle_unbinds() {
        let handle = begin(rid("req_leak")).unwrap();
        drop(handle);
        assert!(!is_active());

        // Fresh begin succeeds after the leak diagnostic.
        let handle = begin(rid("req_leak_2")).unwrap();
        end(handle).unwrap();
    }

    #[test]
    fn test_slots_preserve_open_order() {
        let handle = begin(rid("req_order")).unwrap();

        let outer = open_slot().unwrap();
        let inner = open_slot().unwrap();
        assert_eq!(outer.index, 0);
        assert_eq!(inner.index, 1);

        // Inner closes first; open order must survive.
        fill_slot(
            inner,
            Span {
                name: "inner".to_string(),
                start_offset: inner.start_offset,
                duration: Duration::from_millis(1),
                status: SpanStatus::Ok,
                metadata: Default::default(),
            },
        );
        fill_slot(
            outer,
            Span {
                name: "outer".to_string(),
                start_offset: outer.start_offset,
                duration: Duration::from_millis(2),
                status: SpanStatus::Ok,
                metadata: Default::default(),
            },
        );

        let trace = end(handle).unwrap();
        let names: Vec<&str> = trace.spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["outer", "inner"]);
    }

    #[test]
    fn test_open_slot_without_context_is_noop() {
        assert!(open_slot().is_none());
    }

    #[test]
    fn test_unclosed_slot_discarded_at_finalize() {
        let handle = begin(rid("req_dangling")).unwrap();
        let _never_closed = open_slot().unwrap();
        let trace = end(handle).unwrap();
        assert_eq!(trace.span_count(), 0);
    }
}
