use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use event_listener::Event;
use fluvio_future::task::spawn;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{Context, ReconcileOutcome};

/// A set of concurrent units working on parts of the same reconcile pass.
///
/// A default group is valid and never cancels anything. A group created with
/// [`ReconcileGroup::with_context`] cancels its derived context the first time
/// the merged outcome becomes terminal, or when [`ReconcileGroup::wait`] returns.
#[derive(Debug, Default)]
pub struct ReconcileGroup {
    state: Arc<GroupState>,
}

#[derive(Debug, Default)]
struct GroupState {
    result: Mutex<ReconcileOutcome>,
    pending: AtomicUsize,
    finished: Event,
    ctx: Option<Context>,
}

impl GroupState {
    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// fold outcome into running result, cancel on first terminal result
    fn record(&self, outcome: ReconcileOutcome) {
        let mut result = self.result.lock();
        let merged = std::mem::take(&mut *result).merge(outcome);
        if merged.is_completed() {
            if let Some(ctx) = &self.ctx {
                if ctx.cancel() {
                    debug!("terminal outcome merged, group cancelled");
                }
            }
        }
        *result = merged;
    }
}

/// decrements pending count even if the unit never completes normally
struct PendingGuard {
    state: Arc<GroupState>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.state.pending.fetch_sub(1, Ordering::SeqCst);
        self.state.finished.notify(usize::MAX);
    }
}

impl ReconcileGroup {
    /// Create a group together with a context derived from `parent`.
    ///
    /// Units should observe the returned context and stop mutating once it is
    /// cancelled.
    pub fn with_context(parent: &Context) -> (Self, Context) {
        let ctx = parent.child();
        let group = Self {
            state: Arc::new(GroupState {
                ctx: Some(ctx.clone()),
                ..Default::default()
            }),
        };
        (group, ctx)
    }

    /// run a unit concurrently, its outcome is merged into the group result
    pub fn go<F>(&self, unit: F)
    where
        F: Future<Output = ReconcileOutcome> + Send + 'static,
    {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard {
            state: self.state.clone(),
        };

        spawn(async move {
            let outcome = unit.await;
            trace!(?outcome, "unit finished");
            guard.state.record(outcome);
            drop(guard);
        });
    }

    /// number of units still running
    pub fn pending(&self) -> usize {
        self.state.pending()
    }

    /// Wait for every launched unit and return the merged outcome.
    pub async fn wait(self) -> ReconcileOutcome {
        loop {
            if self.state.pending() == 0 {
                break;
            }

            let listener = self.state.finished.listen();

            if self.state.pending() == 0 {
                break;
            }

            listener.await;
        }

        if let Some(ctx) = &self.state.ctx {
            ctx.cancel();
        }

        std::mem::take(&mut *self.state.result.lock())
    }
}

#[cfg(test)]
mod test {

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use fluvio_future::timer::sleep;

    use crate::{Context, ReconcileError, ReconcileOutcome};

    use super::ReconcileGroup;

    #[fluvio_future::test]
    async fn test_empty_group() {
        let group = ReconcileGroup::default();
        assert_eq!(group.wait().await, ReconcileOutcome::proceed());

        let parent = Context::background();
        let (group, ctx) = ReconcileGroup::with_context(&parent);
        assert_eq!(group.wait().await, ReconcileOutcome::proceed());
        assert!(ctx.is_cancelled(), "wait always cancels the derived context");
        assert!(!parent.is_cancelled());
    }

    #[fluvio_future::test]
    async fn test_merge_all_units() {
        let group = ReconcileGroup::default();

        for (i, secs) in [30_u64, 10, 20].into_iter().enumerate() {
            group.go(async move {
                sleep(Duration::from_millis(5 * i as u64)).await;
                ReconcileOutcome::continue_and_requeue(Duration::from_secs(secs))
            });
        }
        group.go(async { ReconcileOutcome::continue_with_error(ReconcileError::msg("rack2")) });
        group.go(async { ReconcileOutcome::continue_with_error(ReconcileError::msg("rack3")) });

        let outcome = group.wait().await;
        assert!(!outcome.is_completed());
        assert_eq!(outcome.delay(), Duration::ZERO, "error drops the delay");
        let err = outcome.error().expect("error");
        assert_eq!(err.len(), 2);
        assert!(err.contains("rack2"));
        assert!(err.contains("rack3"));
    }

    #[fluvio_future::test]
    async fn test_default_group_never_cancels() {
        let group = ReconcileGroup::default();
        group.go(async { ReconcileOutcome::done() });
        group.go(async {
            sleep(Duration::from_millis(20)).await;
            ReconcileOutcome::continue_and_requeue(Duration::from_secs(5))
        });

        assert_eq!(
            group.wait().await,
            ReconcileOutcome::complete_and_requeue(Duration::from_secs(5))
        );
    }

    #[fluvio_future::test]
    async fn test_first_terminal_cancels_siblings() {
        let parent = Context::background();
        let (group, ctx) = ReconcileGroup::with_context(&parent);
        let skipped = Arc::new(AtomicUsize::new(0));

        group.go(async { ReconcileOutcome::complete_with_error(ReconcileError::msg("fatal")) });

        for _ in 0..3 {
            let unit_ctx = ctx.clone();
            let skipped = skipped.clone();
            group.go(async move {
                // cooperative: stop before doing anything once cancelled
                unit_ctx.cancelled().await;
                skipped.fetch_add(1, Ordering::SeqCst);
                ReconcileOutcome::proceed()
            });
        }

        let outcome = group.wait().await;
        assert!(outcome.is_completed());
        assert!(outcome.error().expect("error").contains("fatal"));
        assert_eq!(skipped.load(Ordering::SeqCst), 3);
        assert!(ctx.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[fluvio_future::test]
    async fn test_parent_cancel_reaches_units() {
        let parent = Context::background();
        let (group, ctx) = ReconcileGroup::with_context(&parent);

        let unit_ctx = ctx.clone();
        group.go(async move {
            unit_ctx.cancelled().await;
            ReconcileOutcome::proceed()
        });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(group.pending(), 1);
        parent.cancel();

        assert_eq!(group.wait().await, ReconcileOutcome::proceed());
    }
}
