use serde::{Deserialize, Serialize};

/// Count/size summary over every blob in a store.
///
/// Computed fresh on each request and never persisted. When `count` is zero
/// the min and max sizes are reported as zero and [`average`](Self::average)
/// is undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub count: u64,
    pub total_size: u64,
    pub min_size: u64,
    pub max_size: u64,
}

impl StatisticsSummary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sequential fold over a set of blob sizes.
    pub fn from_sizes(sizes: impl IntoIterator<Item = u64>) -> Self {
        sizes.into_iter().fold(Self::empty(), |acc, size| {
            if acc.count == 0 {
                Self {
                    count: 1,
                    total_size: size,
                    min_size: size,
                    max_size: size,
                }
            } else {
                Self {
                    count: acc.count + 1,
                    total_size: acc.total_size + size,
                    min_size: acc.min_size.min(size),
                    max_size: acc.max_size.max(size),
                }
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Integer mean blob size, `None` for an empty summary.
    pub fn average(&self) -> Option<u64> {
        self.total_size.checked_div(self.count)
    }
}
