//! Process-wide cooperative cancellation signal (spec §4.B, §5).

use std::sync::Arc;

use tokio::sync::watch;

/// A cheap-to-clone handle that every worker, stage queue, and chunk
/// translation loop observes between suspension points. `cancel()` is
/// idempotent and the reason from the first call wins.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    tx: watch::Sender<Option<String>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { inner: Arc::new(Inner { tx }) }
    }

    /// Fire the token. A second call with a different reason is ignored;
    /// the first cancellation reason is what gets recorded.
    pub fn cancel(&self, reason: impl Into<String>) {
        let _ = self.inner.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.into());
                true
            } else {
                false
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.tx.borrow().clone()
    }

    /// Resolves once `cancel()` has been called. Used by workers blocked
    /// on queue operations so they can race cancellation against I/O.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.tx.subscribe();
        if rx.borrow().is_some() {
            return;
        }
        while rx.changed().await.is_ok() {
            if rx.borrow().is_some() {
                return;
            }
        }
    }
}
