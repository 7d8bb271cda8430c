use core::future::Future;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Shared lifetime of every task belonging to one sieve pipeline.
///
/// All tasks are spawned through the same [`TaskTracker`] and watch the same
/// [`CancellationToken`], so cancelling the token reaches generators that were
/// spawned long after the pipeline started (one per confirmed prime).
#[derive(Clone, Debug, Default)]
pub(crate) struct Scope {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.tracker.spawn(task));
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels every task in the scope. Safe to call more than once.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels, then waits until every spawned task has returned.
    pub(crate) async fn shutdown(&self) {
        self.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Number of tasks still running.
    pub(crate) fn live_tasks(&self) -> usize {
        self.tracker.len()
    }
}
