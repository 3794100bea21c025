use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Fired when a flip leader's peer did not connect in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StuckTimeout {
    pub peer_id: String,
    pub generation: u64,
}

/// One-shot timer task. Dropping or cancelling it aborts the task.
#[derive(Debug)]
pub(crate) struct StuckTimer {
    abort: AbortHandle,
}

impl StuckTimer {
    pub fn arm(
        peer_id: String,
        generation: u64,
        after: Duration,
        tx: mpsc::UnboundedSender<StuckTimeout>,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(StuckTimeout {
                peer_id,
                generation,
            });
        });
        Self {
            abort: task.abort_handle(),
        }
    }
}

impl Drop for StuckTimer {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
