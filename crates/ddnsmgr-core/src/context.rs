//! Cooperative cancellation for one update run
//!
//! A [`RunContext`] is threaded through detection, resolution, updater calls
//! and retry loops. It is cheap to clone; every clone observes the same
//! cancellation flag. Nothing is aborted forcibly: callees check
//! [`RunContext::is_cancelled`] or race against [`RunContext::cancelled`].

use tokio::sync::watch;

/// Cancellation-aware context shared by everything a run touches
#[derive(Debug, Clone)]
pub struct RunContext {
    cancelled: watch::Receiver<bool>,
}

/// Owner side of a [`RunContext`]; dropping it without cancelling leaves the
/// context live forever
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl RunContext {
    /// Create a new context together with the handle that cancels it
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancelled: rx }, CancelHandle { tx })
    }

    /// A context that can never be cancelled
    pub fn background() -> Self {
        Self::new().0
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// Pends forever if the [`CancelHandle`] was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        let observed = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !observed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CancelHandle {
    /// Request cancellation of every clone of the associated context
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Create another context observing this handle
    pub fn context(&self) -> RunContext {
        RunContext {
            cancelled: self.tx.subscribe(),
        }
    }
}
