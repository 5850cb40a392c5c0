use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which long-running operation a [`ProgressEvent`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    IndexBuild,
    Match,
    Dedupe,
}

/// One unit of progress reported by the scanner, a batch matcher, or the
/// deduper. `total` is `None` when the operation doesn't know its total
/// item count ahead of time.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub done: u64,
    pub total: Option<u64>,
    pub label: Option<String>,
}

/// Caller-supplied sink for progress events. The sink is expected to be
/// non-blocking; a slow or panicking sink is the caller's problem, not the
/// core's. A no-op implementation is provided for callers that don't care.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A sink that drops every event.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Shared flag a caller can flip to ask a long-running operation to stop.
///
/// This generalizes the teacher's `closing::CLOSED` atomic bool (checked via
/// `err_if_closed()` before starting each unit of work) into a plain,
/// caller-owned token instead of a process-wide signal-driven singleton: the
/// core itself never installs signal handlers.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Returns `true` the first time it is called.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        assert!(!token.cancel());
    }

    #[test]
    fn cancellation_token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn null_sink_accepts_events_without_panicking() {
        let sink = NullProgressSink;
        sink.report(ProgressEvent { phase: Phase::Scan, done: 1, total: None, label: None });
    }
}
