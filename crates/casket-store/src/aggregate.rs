//! Whole-store statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use casket_types::StatisticsSummary;
use tracing::debug;

use crate::error::StoreResult;
use crate::fanout::{for_each_key, FanOut};
use crate::traits::BlobStore;

/// Lock-free accumulator of blob sizes.
///
/// Safe to share across any number of concurrent recorders. Every field is
/// updated with its own compare-and-swap retry loop; none of them ever wait
/// on a lock.
#[derive(Debug)]
pub struct StatsAccumulator {
    count: AtomicU64,
    total: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Fold one blob size into the running totals.
    pub fn record(&self, size: u64) {
        self.count.fetch_add(1, Ordering::AcqRel);
        retry_update(&self.total, |current| Some(current.saturating_add(size)));
        retry_update(&self.min, |current| (size < current).then_some(size));
        retry_update(&self.max, |current| (size > current).then_some(size));
    }

    /// Snapshot of the totals. Empty when nothing was recorded.
    pub fn summary(&self) -> StatisticsSummary {
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            return StatisticsSummary::empty();
        }
        StatisticsSummary {
            count,
            total_size: self.total.load(Ordering::Acquire),
            min_size: self.min.load(Ordering::Acquire),
            max_size: self.max.load(Ordering::Acquire),
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read, compute a candidate, and conditionally swap until the swap lands or
/// `next` declines to change the value.
fn retry_update(cell: &AtomicU64, next: impl Fn(u64) -> Option<u64>) {
    let mut current = cell.load(Ordering::Acquire);
    while let Some(candidate) = next(current) {
        match cell.compare_exchange_weak(current, candidate, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

/// Count and size every blob in `store`.
///
/// Metadata is fetched per key in parallel. Keys deleted between listing and
/// describe are skipped. The first failed describe aborts the whole run and
/// no partial summary is returned.
pub async fn compute_statistics<S>(store: &Arc<S>, fan_out: &FanOut) -> StoreResult<StatisticsSummary>
where
    S: BlobStore + ?Sized + 'static,
{
    let stats = Arc::new(StatsAccumulator::new());
    let recorder = Arc::clone(&stats);
    let describer = Arc::clone(store);

    for_each_key(store, fan_out, move |key| {
        let stats = Arc::clone(&recorder);
        let store = Arc::clone(&describer);
        async move {
            match store.describe(&key).await? {
                Some(meta) => stats.record(meta.content_length()),
                None => debug!(key = %key, "key vanished before describe; skipped"),
            }
            Ok(())
        }
    })
    .await?;

    let summary = stats.summary();
    debug!(count = summary.count, total = summary.total_size, "statistics computed");
    Ok(summary)
}
