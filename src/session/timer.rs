use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Single-shot deadline for one pause episode. Cancelling wins over an
/// expiry that has not started running yet; callers that race against an
/// expiry already in flight must settle it under their own lock.
pub struct ResumeTimer {
    cancel: CancellationToken,
}

impl ResumeTimer {
    /// Spawns the countdown on `runtime`. The caller does not need to be
    /// inside a runtime context itself.
    pub fn start<F>(runtime: &Handle, timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => on_expire(),
            }
        });

        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ResumeTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
