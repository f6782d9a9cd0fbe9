use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A cooperative cancellation signal shared between the caller and a training job.
///
/// Cancelling never preempts work already running; the job only observes the
/// signal before starting its next sample.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the job holding this token to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether a stop was requested. Never blocks.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clears a previous stop request so the same token can guard a new pass.
    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}
