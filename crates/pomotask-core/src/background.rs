//! Cancellable loops spawned on the host's tokio runtime.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A spawned loop and the token that asks it to exit.
pub(crate) struct BackgroundTask {
    name: &'static str,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `body` on the current runtime. The loop must return once the
    /// token it is handed is cancelled.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub(crate) fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(body(cancel.clone()));
        debug!(task = name, "background task spawned");
        Self { name, cancel, join }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancelled, but the loop has not exited yet.
    pub(crate) fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled() && !self.join.is_finished()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait up to `timeout` for the loop to exit.
    ///
    /// Returns `false` if it is still running. The handle then stays valid,
    /// so the caller must keep it and may shut it down again later.
    pub(crate) async fn shutdown(&mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, &mut self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(task = self.name, error = %e, "background task ended abnormally");
                true
            }
            Err(_) => {
                warn!(task = self.name, ?timeout, "background task did not stop in time");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_cancels_a_sleeping_loop() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let mut task = BackgroundTask::spawn("sleeper", move |cancel| async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
            }
            flag.store(true, Ordering::SeqCst);
        });
        assert!(!task.is_finished());
        assert!(!task.is_stopping());

        assert!(task.shutdown(Duration::from_secs(1)).await);
        assert!(exited.load(Ordering::SeqCst));
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn busy_loop_is_kept_until_it_exits() {
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let mut task = BackgroundTask::spawn("busy", move |_cancel| async move {
            // Ignores cancellation until released.
            let _ = gate.await;
        });

        assert!(!task.shutdown(Duration::from_millis(20)).await);
        assert!(task.is_stopping());

        release.send(()).unwrap();
        assert!(task.shutdown(Duration::from_secs(1)).await);
        assert!(!task.is_stopping());
    }
}
