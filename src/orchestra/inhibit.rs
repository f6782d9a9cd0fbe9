use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::debug;

/// Keeps the host from idling or sleeping while a long job runs.
pub trait IdleInhibitor: Send + Sync {
    fn inhibit(&self);
    fn release(&self);
}

/// An inhibitor for hosts without idle management.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInhibitor;

impl IdleInhibitor for NoopInhibitor {
    fn inhibit(&self) {
        debug!("idle inhibition requested");
    }

    fn release(&self) {
        debug!("idle inhibition released");
    }
}

/// Marks the orchestrator busy and the host inhibited for as long as it lives.
///
/// Dropping it, even while unwinding from a panicking job, returns the
/// orchestrator to idle.
pub(crate) struct BusyGuard {
    busy: Arc<AtomicBool>,
    inhibitor: Arc<dyn IdleInhibitor>,
    inhibited: bool,
}

impl BusyGuard {
    /// Claims the busy flag, `None` if it is already taken.
    pub(crate) fn acquire(
        busy: &Arc<AtomicBool>,
        inhibitor: &Arc<dyn IdleInhibitor>,
    ) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(Self {
            busy: Arc::clone(busy),
            inhibitor: Arc::clone(inhibitor),
            inhibited: false,
        })
    }

    /// Starts inhibiting idle; paired with the release on drop.
    pub(crate) fn inhibit(&mut self) {
        self.inhibitor.inhibit();
        self.inhibited = true;
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.inhibited {
            self.inhibitor.release();
        }
        self.busy.store(false, Ordering::Release);
    }
}
