//! `Expect: 100-continue` negotiation signal.
//!
//! The request layer creates a [`ContinueExpectation`] when it sends
//! `Expect: 100-continue`, hands a clone to the response, and waits on it
//! before writing the request body. The response resolves it when the `100`
//! interim status arrives, or abandons it when a final status shows up first.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueOutcome {
    /// Server sent `100 Continue`; the body may be written.
    Continue,
    /// Negotiation ended without a `100`; the body must not be written.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct ContinueExpectation {
    tx: Arc<watch::Sender<Option<ContinueOutcome>>>,
}

impl Default for ContinueExpectation {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinueExpectation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<ContinueOutcome> {
        *self.tx.borrow()
    }

    /// Mark the `100 Continue` as received. First resolution wins.
    pub fn resolve(&self) -> bool {
        self.settle(ContinueOutcome::Continue)
    }

    /// Give up on the interim response. First resolution wins.
    pub fn abandon(&self) -> bool {
        self.settle(ContinueOutcome::Abandoned)
    }

    fn settle(&self, outcome: ContinueOutcome) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// Wait until the expectation is resolved or abandoned.
    pub async fn wait(&self) -> ContinueOutcome {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(ContinueOutcome::Abandoned),
            Err(_) => ContinueOutcome::Abandoned,
        };
        outcome
    }
}
