//! Execution-context affinity.
//!
//! All server lifecycle state is owned by one tokio task per
//! [`ServerContext`](crate::ServerContext). Code running inside that task
//! carries the context's id in a task-local, which lets callers check (or
//! assert) that they are on the owning context before touching state that
//! has no lock.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

tokio::task_local! {
    static CURRENT: ContextId;
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one server context task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Returns the context the caller is running on, if any.
#[must_use]
pub fn current() -> Option<ContextId> {
    CURRENT.try_with(|id| *id).ok()
}

/// Returns true if the caller runs on context `id`.
#[must_use]
pub fn is_on(id: ContextId) -> bool {
    current() == Some(id)
}

/// Panics unless the caller runs on context `id`.
#[track_caller]
pub fn require(id: ContextId) {
    assert!(
        is_on(id),
        "must be called on server context {id} (currently on {:?})",
        current()
    );
}

/// Runs `future` with `id` marked as the current context.
pub(crate) async fn scope<F: Future>(id: ContextId, future: F) -> F::Output {
    CURRENT.scope(id, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outside_any_context() {
        assert_eq!(current(), None);
        assert!(!is_on(ContextId::next()));
    }

    #[tokio::test]
    async fn scoped_future_sees_its_context() {
        let id = ContextId::next();
        let other = ContextId::next();

        scope(id, async move {
            assert!(is_on(id));
            assert!(!is_on(other));
            require(id);
        })
        .await;

        assert_eq!(current(), None);
    }

    #[tokio::test]
    #[should_panic(expected = "must be called on server context")]
    async fn require_panics_off_context() {
        require(ContextId::next());
    }
}
