//! One-shot timer scheduling.
//!
//! Every timer is a spawned task recorded as an `AbortHandle` on the owning
//! session. Cancellation aborts the task; a task that fires anyway must
//! re-validate session state before acting, so a cancelled step is never
//! externally visible.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Run `task` after `delay_ms`. The returned handle cancels it.
pub fn schedule<F>(delay_ms: i64, task: F) -> AbortHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let delay = Duration::from_millis(delay_ms.max(0) as u64);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    });
    handle.abort_handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _handle = schedule(1000, async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_millis(999)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_task_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = schedule(1000, async move {
            flag.store(true, Ordering::SeqCst);
        });
        handle.abort();

        tokio::time::advance(Duration::from_millis(2000)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
