//! Implicit sender tracking.
//!
//! While a facade actor runs one of its hooks, the task running it carries
//! that actor's handle. Sends made without an explicit sender pick it up, so
//! the receiver can reply without the caller ever naming itself.

use std::future::Future;

use crate::handle::ActorHandle;

tokio::task_local! {
    static CURRENT_ACTOR: ActorHandle;
}

/// Task-scoped "actor currently processing a callback".
///
/// The slot is keyed by tokio task, so actors running concurrently never see
/// each other's value. Scopes nest: leaving an inner scope restores the outer
/// actor, on normal return, error return and unwinding alike.
pub struct SenderContext;

impl SenderContext {
    /// The actor whose callback is running on this task, if any.
    pub fn current() -> Option<ActorHandle> {
        CURRENT_ACTOR.try_with(ActorHandle::clone).ok()
    }

    /// Run `body` with `actor` as the current actor.
    pub async fn scope<F: Future>(actor: ActorHandle, body: F) -> F::Output {
        CURRENT_ACTOR.scope(actor, body).await
    }

    /// Synchronous variant of [`SenderContext::scope`].
    pub fn sync_scope<R>(actor: ActorHandle, body: impl FnOnce() -> R) -> R {
        CURRENT_ACTOR.sync_scope(actor, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scopes_nest_and_restore() {
        let outer = ActorHandle::selection("sys/user/outer");
        let inner = ActorHandle::selection("sys/user/inner");

        assert!(SenderContext::current().is_none());
        SenderContext::scope(outer.clone(), async {
            assert_eq!(SenderContext::current(), Some(outer.clone()));
            SenderContext::scope(inner.clone(), async {
                assert_eq!(SenderContext::current(), Some(inner.clone()));
            })
            .await;
            assert_eq!(SenderContext::current(), Some(outer.clone()));
        })
        .await;
        assert!(SenderContext::current().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_tasks_are_isolated() {
        let tasks = (0..8).map(|i| {
            tokio::spawn(async move {
                let me = ActorHandle::selection(format!("sys/user/a{i}"));
                SenderContext::scope(me.clone(), async move {
                    tokio::task::yield_now().await;
                    SenderContext::current() == Some(me)
                })
                .await
            })
        });

        for task in tasks {
            assert!(task.await.unwrap());
        }
    }

    #[test]
    fn test_sync_scope_restores_after_panic() {
        let actor = ActorHandle::selection("sys/user/panicky");
        let result = std::panic::catch_unwind(|| {
            SenderContext::sync_scope(actor, || panic!("boom"));
        });

        assert!(result.is_err());
        assert!(SenderContext::current().is_none());
    }
}
