//! Lazy, single-pass enumeration over a paginated remote listing.
//!
//! A [`LazyPagedSequence`] turns a [`PageSource`] into one uniform sequence of
//! items. Nothing is fetched at construction. The first consumption attempt
//! materializes the sequence by fetching the first page; concurrent first
//! consumers all observe that single fetch. After that, items are handed out
//! exactly once each, in page order, to whichever consumer asks next.
//!
//! Every produced item is a `StoreResult<T>`, so a page-fetch failure is
//! reported at the point of consumption in its original kind.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// One batch of a paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the following page. `None` marks the final page.
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, continuation: Option<String>) -> Self {
        Self {
            items,
            continuation,
        }
    }

    /// A page with nothing after it.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            continuation: self.continuation,
        }
    }
}

/// A paginated listing capability.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetch the first page of the listing.
    async fn first_page(&self) -> StoreResult<Page<T>>;

    /// Fetch the page following the one that carried `continuation`.
    async fn next_page(&self, continuation: &str) -> StoreResult<Page<T>>;
}

struct Cursor<T> {
    buffered: VecDeque<T>,
    continuation: Option<String>,
}

impl<T> Cursor<T> {
    fn from_page(page: Page<T>) -> Self {
        Self {
            buffered: page.items.into(),
            continuation: page.continuation,
        }
    }

    fn refill(&mut self, page: Page<T>) {
        self.buffered.extend(page.items);
        self.continuation = page.continuation;
    }
}

/// Forward-only, single-pass sequence over every item of a paged listing.
///
/// The materialized cursor is published once through a [`OnceCell`]: readers
/// that find it set take an unsynchronized fast path; a reader that finds it
/// unset takes the cell's internal lock, re-checks, and only then fetches the
/// first page. If that first fetch fails the cell stays unset and the error
/// is returned to the consumer; a later attempt fetches again.
///
/// Once a later page fails, the sequence is exhausted: the failure is
/// yielded once and every subsequent call returns `None`. The sequence
/// cannot be reset; enumerate again with a new instance.
pub struct LazyPagedSequence<T> {
    source: Box<dyn PageSource<T>>,
    cursor: OnceCell<Mutex<Cursor<T>>>,
}

impl<T: Send + 'static> LazyPagedSequence<T> {
    pub fn new(source: impl PageSource<T> + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn PageSource<T>>) -> Self {
        Self {
            source,
            cursor: OnceCell::new(),
        }
    }

    /// Whether the first page has been fetched.
    pub fn is_materialized(&self) -> bool {
        self.cursor.initialized()
    }

    async fn materialized(&self) -> StoreResult<&Mutex<Cursor<T>>> {
        self.cursor
            .get_or_try_init(|| async {
                let first = self.source.first_page().await?;
                debug!(
                    items = first.items.len(),
                    more = !first.is_last(),
                    "materialized first listing page"
                );
                Ok::<_, StoreError>(Mutex::new(Cursor::from_page(first)))
            })
            .await
    }

    /// Take the next item, fetching further pages as needed.
    ///
    /// Returns `None` once every page has been drained.
    pub async fn next(&self) -> Option<StoreResult<T>> {
        let cursor = match self.materialized().await {
            Ok(cursor) => cursor,
            Err(e) => return Some(Err(e)),
        };
        let mut cursor = cursor.lock().await;
        loop {
            if let Some(item) = cursor.buffered.pop_front() {
                return Some(Ok(item));
            }
            // Taking the token first fuses the sequence if the fetch fails.
            let token = cursor.continuation.take()?;
            match self.source.next_page(&token).await {
                Ok(page) => {
                    debug!(items = page.items.len(), more = !page.is_last(), "fetched listing page");
                    cursor.refill(page);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Drain the remaining items, stopping at the first error.
    pub async fn try_collect(&self) -> StoreResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Consume the sequence as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = StoreResult<T>> + Send {
        stream::unfold(self, |seq| async move {
            let item = seq.next().await?;
            Some((item, seq))
        })
    }
}

impl<T> std::fmt::Debug for LazyPagedSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyPagedSequence")
            .field("materialized", &self.cursor.initialized())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// Serves every item on a single page.
    pub(crate) struct Fixed<T>(pub Vec<T>);

    #[async_trait]
    impl<T: Clone + Send + Sync> PageSource<T> for Fixed<T> {
        async fn first_page(&self) -> StoreResult<Page<T>> {
            Ok(Page::last(self.0.clone()))
        }

        async fn next_page(&self, _continuation: &str) -> StoreResult<Page<T>> {
            Ok(Page::last(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Serves fixed pages; the continuation token is the index of the next page.
    struct CountingPages {
        pages: Vec<Vec<u32>>,
        first_calls: Arc<AtomicUsize>,
        next_calls: Arc<AtomicUsize>,
        first_delay: Duration,
        fail_at: Option<usize>,
    }

    impl CountingPages {
        fn new(pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                first_calls: Arc::new(AtomicUsize::new(0)),
                next_calls: Arc::new(AtomicUsize::new(0)),
                first_delay: Duration::ZERO,
                fail_at: None,
            }
        }

        fn page(&self, index: usize) -> StoreResult<Page<u32>> {
            if self.fail_at == Some(index) {
                return Err(StoreError::Transport(format!("page {index} unavailable")));
            }
            let items = self.pages.get(index).cloned().unwrap_or_default();
            let continuation = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(Page::new(items, continuation))
        }
    }

    #[async_trait]
    impl PageSource<u32> for CountingPages {
        async fn first_page(&self) -> StoreResult<Page<u32>> {
            self.first_calls.fetch_add(1, Ordering::SeqCst);
            if !self.first_delay.is_zero() {
                tokio::time::sleep(self.first_delay).await;
            }
            self.page(0)
        }

        async fn next_page(&self, continuation: &str) -> StoreResult<Page<u32>> {
            self.next_calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = continuation.parse().expect("numeric token");
            self.page(index)
        }
    }

    #[tokio::test]
    async fn yields_every_item_in_page_order() {
        let source = CountingPages::new(vec![vec![1, 2], vec![3, 4], vec![5]]);
        let next_calls = Arc::clone(&source.next_calls);
        let seq = LazyPagedSequence::new(source);

        assert_eq!(seq.try_collect().await.unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(next_calls.load(Ordering::SeqCst), 2);
        // Single pass: a drained sequence stays drained.
        assert!(seq.next().await.is_none());
    }

    #[tokio::test]
    async fn construction_fetches_nothing() {
        let source = CountingPages::new(vec![vec![1]]);
        let first_calls = Arc::clone(&source.first_calls);
        let seq = LazyPagedSequence::new(source);

        assert!(!seq.is_materialized());
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);

        assert_eq!(seq.next().await.unwrap().unwrap(), 1);
        assert!(seq.is_materialized());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_pages_are_skipped() {
        let source = CountingPages::new(vec![vec![], vec![], vec![7], vec![]]);
        let seq = LazyPagedSequence::new(source);
        assert_eq!(seq.try_collect().await.unwrap(), vec![7]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_consumers_share_one_first_fetch() {
        let mut source = CountingPages::new(vec![vec![1, 2], vec![3, 4], vec![5]]);
        source.first_delay = Duration::from_millis(50);
        let first_calls = Arc::clone(&source.first_calls);
        let seq = Arc::new(LazyPagedSequence::new(source));

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let seq = Arc::clone(&seq);
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(item) = seq.next().await {
                        seen.push(item.unwrap());
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.expect("consumer should not panic"));
        }
        all.sort();

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn later_page_failure_surfaces_then_fuses() {
        let mut source = CountingPages::new(vec![vec![1], vec![2], vec![3]]);
        source.fail_at = Some(1);
        let seq = LazyPagedSequence::new(source);

        assert_eq!(seq.next().await.unwrap().unwrap(), 1);
        let err = seq.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::Transport(ref m) if m.contains("page 1")));
        assert!(seq.next().await.is_none());
    }

    #[tokio::test]
    async fn first_page_failure_is_retried_on_next_attempt() {
        let mut source = CountingPages::new(vec![vec![1]]);
        source.fail_at = Some(0);
        let first_calls = Arc::clone(&source.first_calls);
        let seq = LazyPagedSequence::new(source);

        assert!(seq.next().await.unwrap().is_err());
        assert!(!seq.is_materialized());
        assert!(seq.next().await.unwrap().is_err());
        assert_eq!(first_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_view_matches_sequential_consumption() {
        let source = CountingPages::new(vec![vec![1, 2], vec![3]]);
        let items: Vec<u32> = LazyPagedSequence::new(source)
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn page_map_keeps_continuation() {
        let page = Page::new(vec![1, 2], Some("t".into())).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.continuation.as_deref(), Some("t"));
        assert!(Page::<u8>::last(vec![]).is_last());
    }
}
