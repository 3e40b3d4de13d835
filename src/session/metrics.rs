// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token acquisitions.
#[derive(Debug, Default)]
pub struct TokenSourceMetrics {
	cache_hits: AtomicU64,
	exchanges: AtomicU64,
	failures: AtomicU64,
}
impl TokenSourceMetrics {
	/// Returns the number of acquisitions answered from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of token endpoint exchanges started.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of exchanges that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
