//! Connection leak diagnostics.
//!
//! Responses return or destroy their connection explicitly (`read`,
//! `release`, `close`). Dropping a response that still holds one closes it
//! from `Drop` and is counted here as a leak, so tests and debug tooling can
//! catch callers that forget to dispose of a body.

use std::sync::atomic::{AtomicUsize, Ordering};

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);
static LEAKED: AtomicUsize = AtomicUsize::new(0);

/// Responses currently holding an open connection, process-wide.
pub fn outstanding_connections() -> usize {
    OUTSTANDING.load(Ordering::Relaxed)
}

/// Responses dropped while still holding a connection, process-wide.
pub fn leaked_responses() -> usize {
    LEAKED.load(Ordering::Relaxed)
}

/// Tracks one response's claim on a connection.
///
/// Armed while the connection is held; disarming is idempotent.
#[derive(Debug, Default)]
pub(crate) struct LeakGuard {
    armed: bool,
}

impl LeakGuard {
    pub(crate) fn arm(&mut self) {
        if !self.armed {
            self.armed = true;
            OUTSTANDING.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn disarm(&mut self) {
        if self.armed {
            self.armed = false;
            OUTSTANDING.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Disarm and record a leak.
    pub(crate) fn trip(&mut self) {
        if self.armed {
            self.disarm();
            LEAKED.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for LeakGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-wide and other tests run in parallel, so only
    // relative movement of this guard's own contribution is checked.
    #[test]
    fn test_trip_counts_once() {
        let leaked_before = leaked_responses();
        let mut guard = LeakGuard::default();
        guard.arm();
        guard.arm();
        guard.trip();
        guard.trip();
        assert!(leaked_responses() >= leaked_before + 1);
        assert!(!guard.armed);
    }

    #[test]
    fn test_disarm_is_idempotent() {
        let mut guard = LeakGuard::default();
        guard.arm();
        guard.disarm();
        guard.disarm();
        assert!(!guard.armed);
    }
}
