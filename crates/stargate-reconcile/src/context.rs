use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use event_listener::Event;
use parking_lot::Mutex;
use tracing::trace;

const DEFAULT_EVENT_ORDERING: Ordering = Ordering::SeqCst;

/// Cooperative cancellation scope.
///
/// Cancelling a context cancels every context derived from it. Units doing work
/// on behalf of a context are expected to check it before mutating anything;
/// nothing is interrupted forcibly.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    cancelled: AtomicBool,
    event: Event,
    children: Mutex<Vec<Weak<ContextInner>>>,
}

impl ContextInner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(DEFAULT_EVENT_ORDERING)
    }

    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, DEFAULT_EVENT_ORDERING) {
            return false;
        }
        self.event.notify(usize::MAX);

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
        true
    }
}

impl Context {
    /// root context, only cancelled explicitly
    pub fn background() -> Self {
        Self::default()
    }

    /// derive a context that is cancelled together with this one
    pub fn child(&self) -> Self {
        let child = Self::default();
        {
            let mut children = self.inner.children.lock();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // parent may have been cancelled before registration
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancel this context and all of its children.
    ///
    /// Returns true only for the call that actually performed the cancellation.
    pub fn cancel(&self) -> bool {
        let cancelled = self.inner.cancel();
        if cancelled {
            trace!("context cancelled");
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// resolves once the context is cancelled
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let listener = self.inner.event.listen();

        if self.is_cancelled() {
            return;
        }

        listener.await
    }
}
