//! Single-flight async cache that forgets failures.
//!
//! The cache is `Empty`, `Pending` (one shared in-flight task), or `Ready`.
//! Every caller that arrives while a task is pending awaits that same task.
//! When it settles the cache moves to `Ready` on success and back to `Empty`
//! on failure, so the next caller starts a fresh attempt.
//!
//! A pending attempt runs under the token of the caller that started it. If
//! that token is cancelled, a caller with a live token starts over instead of
//! joining an attempt that can only end in `Cancelled`.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;

type SharedTask<T> = Shared<BoxFuture<'static, Result<T>>>;

enum State<T> {
    Empty,
    Pending {
        attempt: u64,
        task: SharedTask<T>,
        token: CancellationToken,
    },
    Ready(T),
}

struct Inner<T> {
    state: State<T>,
    attempts: u64,
}

pub struct AsyncCache<T: Clone> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
}

impl<T> AsyncCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `name` only labels log events.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                state: State::Empty,
                attempts: 0,
            }),
        }
    }

    /// Return the cached value, join the pending task, or start `init`
    /// under `token`.
    ///
    /// `init` runs only when the cache is empty, or when the pending task's
    /// token is cancelled and `token` is not. A cached value is returned
    /// without awaiting anything.
    pub async fn get_or_try_init<F, Fut>(&self, token: &CancellationToken, init: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (attempt, task) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match &inner.state {
                State::Ready(value) => return Ok(value.clone()),
                State::Pending {
                    attempt,
                    task,
                    token: owner,
                } if !owner.is_cancelled() || token.is_cancelled() => (*attempt, task.clone()),
                _ => {
                    if let State::Pending { attempt, .. } = &inner.state {
                        debug!(cache = self.name, attempt, "pending task was cancelled, restarting");
                    }
                    inner.attempts += 1;
                    let attempt = inner.attempts;
                    debug!(cache = self.name, attempt, "starting task");
                    let task = init().boxed().shared();
                    inner.state = State::Pending {
                        attempt,
                        task: task.clone(),
                        token: token.clone(),
                    };
                    (attempt, task)
                }
            }
        };

        let outcome = task.await;
        self.settle(attempt, &outcome);
        outcome
    }

    fn settle(&self, attempt: u64, outcome: &Result<T>) {
        let mut inner = self.inner.lock();
        // Only the attempt that is still pending may transition the state;
        // waiters of an older attempt must not clobber a newer one.
        let is_current =
            matches!(&inner.state, State::Pending { attempt: current, .. } if *current == attempt);
        if !is_current {
            return;
        }
        inner.state = match outcome {
            Ok(value) => State::Ready(value.clone()),
            Err(err) => {
                debug!(cache = self.name, attempt, error = %err, "task failed, clearing");
                State::Empty
            }
        };
    }

    /// The cached value, if the last attempt succeeded.
    pub fn peek(&self) -> Option<T> {
        match &self.inner.lock().state {
            State::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().state, State::Pending { .. })
    }

    /// Number of times `init` has been started.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.inner.lock().attempts
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use super::*;
    use crate::error::CovtreeError;

    #[tokio::test]
    async fn test_ready_value_is_reused() {
        let cache = AsyncCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_try_init(&CancellationToken::new(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7u32)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek(), Some(7));
    }

    #[tokio::test]
    async fn test_failure_clears_cache() {
        let cache: AsyncCache<u32> = AsyncCache::new("test");

        let err = cache
            .get_or_try_init(&CancellationToken::new(), || async {
                Err(CovtreeError::Provider("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CovtreeError::Provider(_)));
        assert_eq!(cache.peek(), None);
        assert!(!cache.is_pending());

        let value = cache
            .get_or_try_init(&CancellationToken::new(), || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(cache.attempts(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_pending_task() {
        let cache: Arc<AsyncCache<u32>> = Arc::new(AsyncCache::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();
        let token = CancellationToken::new();

        let first = {
            let calls = Arc::clone(&calls);
            cache.get_or_try_init(&token, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = gate.await;
                Ok(42)
            })
        };
        let second = cache.get_or_try_init(&token, || async { Ok(0) });

        let (a, b, _) = tokio::join!(first, second, async {
            tokio::task::yield_now().await;
            let _ = release.send(());
        });
        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.attempts(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_cancelled_task_is_restarted() {
        let cache: AsyncCache<u32> = AsyncCache::new("test");
        let starter = CancellationToken::new();

        // Start an attempt that never finishes, then drop its only waiter.
        {
            let pending = cache.get_or_try_init(&starter, || futures::future::pending());
            tokio::pin!(pending);
            assert!(futures::poll!(pending.as_mut()).is_pending());
        }
        assert!(cache.is_pending());

        // A live pending attempt is joined, not restarted.
        let joined_token = CancellationToken::new();
        let joined = cache.get_or_try_init(&joined_token, || async { Ok(5) });
        tokio::pin!(joined);
        assert!(futures::poll!(joined.as_mut()).is_pending());
        assert_eq!(cache.attempts(), 1);

        starter.cancel();
        let value = cache
            .get_or_try_init(&CancellationToken::new(), || async { Ok(9) })
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(cache.attempts(), 2);
        assert_eq!(cache.peek(), Some(9));
    }
}
