//! Bounded parallel traversal of a lazy paged sequence.
//!
//! A fixed pool of worker tasks pulls items from one shared
//! [`LazyPagedSequence`]. Each item is claimed by exactly one worker. The
//! supervisor reports the first error any worker returns, then aborts the
//! rest. Cancellation through the [`FanOut`]'s token stops every worker at
//! its next await point and is reported as [`StoreError::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::paged::LazyPagedSequence;
use crate::traits::BlobStore;
use casket_types::BlobKey;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Parallelism and cancellation settings for a fan-out operation.
#[derive(Clone, Debug)]
pub struct FanOut {
    concurrency: usize,
    cancel: CancellationToken,
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of worker tasks. Clamped to at least one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop the operation when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `fut` unless `token` fires first.
///
/// When the token wins, `fut` is dropped mid-flight.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        result = fut => result,
    }
}

/// Apply `action` to every item of `items` with bounded parallelism.
///
/// Returns once every item has been handled, or with the first error
/// observed. Items still unclaimed when an error occurs are never handed out.
pub async fn drive<T, F, Fut>(
    items: Arc<LazyPagedSequence<T>>,
    fan_out: &FanOut,
    action: F,
) -> StoreResult<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StoreResult<()>> + Send + 'static,
{
    if fan_out.cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let action = Arc::new(action);
    let mut workers: JoinSet<StoreResult<usize>> = JoinSet::new();
    for _ in 0..fan_out.concurrency {
        let items = Arc::clone(&items);
        let action = Arc::clone(&action);
        let cancel = fan_out.cancel.clone();
        workers.spawn(async move {
            let mut handled = 0usize;
            loop {
                let next = cancellable(&cancel, async { items.next().await.transpose() }).await?;
                let Some(item) = next else {
                    return Ok(handled);
                };
                cancellable(&cancel, action(item)).await?;
                handled += 1;
            }
        });
    }
    debug!(workers = fan_out.concurrency, "fan-out started");

    let handled = supervise(workers, &fan_out.cancel).await?;
    debug!(handled, "fan-out finished");
    Ok(())
}

/// Apply `action` to every key of `store` with bounded parallelism.
pub async fn for_each_key<S, F, Fut>(store: &Arc<S>, fan_out: &FanOut, action: F) -> StoreResult<()>
where
    S: BlobStore + ?Sized,
    F: Fn(BlobKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StoreResult<()>> + Send + 'static,
{
    drive(Arc::new(store.enumerate_keys()), fan_out, action).await
}

async fn supervise(
    mut workers: JoinSet<StoreResult<usize>>,
    cancel: &CancellationToken,
) -> StoreResult<usize> {
    let mut handled = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                workers.abort_all();
                debug!("fan-out cancelled");
                return Err(StoreError::Cancelled);
            }
            joined = workers.join_next() => match joined {
                None => return Ok(handled),
                Some(Ok(Ok(n))) => handled += n,
                Some(Ok(Err(e))) => {
                    workers.abort_all();
                    debug!(error = %e, "fan-out worker failed; aborting the rest");
                    return Err(e);
                }
                Some(Err(join_err)) => {
                    workers.abort_all();
                    if join_err.is_panic() {
                        std::panic::resume_unwind(join_err.into_panic());
                    }
                    return Err(StoreError::InvariantViolation(format!(
                        "fan-out worker stopped unexpectedly: {join_err}"
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paged::{Page, PageSource};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Numbers(Vec<Vec<u32>>);

    #[async_trait]
    impl PageSource<u32> for Numbers {
        async fn first_page(&self) -> StoreResult<Page<u32>> {
            self.next_page("0").await
        }

        async fn next_page(&self, continuation: &str) -> StoreResult<Page<u32>> {
            let index: usize = continuation.parse().expect("numeric token");
            let more = (index + 1 < self.0.len()).then(|| (index + 1).to_string());
            Ok(Page::new(self.0[index].clone(), more))
        }
    }

    fn numbers(pages: Vec<Vec<u32>>) -> Arc<LazyPagedSequence<u32>> {
        Arc::new(LazyPagedSequence::new(Numbers(pages)))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_is_handled_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let items = numbers(vec![(0..50).collect(), (50..100).collect(), vec![100]]);

        drive(items, &FanOut::new().with_concurrency(8), move |n| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(n);
                Ok(())
            }
        })
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 101);
        let unique: BTreeSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 101);
    }

    #[tokio::test]
    async fn first_error_is_reported() {
        let items = numbers(vec![vec![1, 2, 3, 4]]);
        let err = drive(items, &FanOut::new().with_concurrency(2), |n| async move {
            if n == 3 {
                Err(StoreError::Transport("boom".into()))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Transport(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn cancellation_stops_stalled_workers() {
        let token = CancellationToken::new();
        let fan_out = FanOut::new().with_cancellation(token.clone());
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = drive(numbers(vec![vec![1, 2]]), &fan_out, |_| async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_token_does_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let touched = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&touched);
        let result = drive(
            numbers(vec![vec![1]]),
            &FanOut::new().with_cancellation(token),
            move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    *counter.lock().unwrap() += 1;
                    Ok(())
                }
            },
        )
        .await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert_eq!(*touched.lock().unwrap(), 0);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        assert_eq!(FanOut::new().with_concurrency(0).concurrency(), 1);
        assert_eq!(FanOut::default().concurrency(), DEFAULT_CONCURRENCY);
    }
}
