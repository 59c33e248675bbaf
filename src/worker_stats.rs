/// Opt-in batching/cache instrumentation for a single [`BatchingLoader`](crate::BatchingLoader),
/// enabled by the `stats` cargo feature. Carried over from `dataload-rs`'s
/// original per-worker stats and generalized from the single-loader model to
/// the request-scoped batching core.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Human readable name used to identify this loader when stats are reported.
    tag: String,
    /// Number of `load`/`load_all` calls that requested at least one key.
    load_requests: u64,
    /// Total number of keys requested (not necessarily unique).
    items_requested: u64,
    /// Number of keys resolved immediately from the cache.
    cache_hits: u64,
    /// Number of batches dispatched to the fetcher.
    batches: u64,
    /// Average number of unique keys per dispatched batch.
    average_batch_size: f64,
    /// Largest batch dispatched.
    max_batch_size: u64,
    /// Smallest batch dispatched.
    min_batch_size: u64,
    /// Number of batches whose fetcher call reported a contract violation.
    contract_violations: u64,
}

impl WorkerStats {
    pub fn new(tag: impl Into<String>) -> Self {
        WorkerStats { tag: tag.into(), min_batch_size: u64::MAX, ..Default::default() }
    }

    pub fn record_load_request(&mut self, keys_requested: u64, cache_hits: u64) {
        self.load_requests += 1;
        self.items_requested += keys_requested;
        self.cache_hits += cache_hits;
    }

    pub fn record_batch(&mut self, unique_key_count: u64) {
        let total_batches = self.batches + 1;
        self.average_batch_size = ((self.average_batch_size * self.batches as f64)
            + unique_key_count as f64)
            / total_batches as f64;
        self.batches = total_batches;

        if unique_key_count > self.max_batch_size {
            self.max_batch_size = unique_key_count;
        }
        if unique_key_count < self.min_batch_size {
            self.min_batch_size = unique_key_count;
        }
    }

    pub fn record_contract_violation(&mut self) {
        self.contract_violations += 1;
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn load_requests(&self) -> u64 {
        self.load_requests
    }

    pub fn items_requested(&self) -> u64 {
        self.items_requested
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn average_batch_size(&self) -> f64 {
        self.average_batch_size
    }

    pub fn max_batch_size(&self) -> u64 {
        self.max_batch_size
    }

    pub fn min_batch_size(&self) -> u64 {
        if self.batches == 0 {
            0
        } else {
            self.min_batch_size
        }
    }

    pub fn contract_violations(&self) -> u64 {
        self.contract_violations
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(worker_stats = ?self, "batching loader stats");
    }
}
