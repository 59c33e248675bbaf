use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::LoadingError;
use crate::fetcher::BatchFn;

#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

/// Batches concurrently issued single-key loads into bounded-size fetch
/// calls against a slow backend, caching successful results.
///
/// This is the core described in spec.md §4.1: a `BatchingLoader` holds at
/// most one open [`Batch`](PendingBatch) at a time. The first miss after the
/// loader is idle opens a batch and starts a `wait`-duration timer; every
/// subsequent miss before the timer fires (or before the batch reaches
/// `max_batch` keys) joins that same batch. Whichever of the timer or the
/// size cap fires first detaches the batch from the loader (so a fresh one
/// can open for later callers) and dispatches it to the fetcher outside the
/// loader's lock.
///
/// Like `dataload-rs`'s original `Loader`, a `BatchingLoader` is meant to be
/// constructed once per request and dropped at the end of it: its cache is
/// unbounded and never evicts.
pub struct BatchingLoader<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    state: Arc<Mutex<LoaderState<K, V, E>>>,
    fetcher: Arc<dyn BatchFn<K, V, Error = E> + Send + Sync>,
    max_batch: usize,
    wait: Duration,
    label: String,
}

struct LoaderState<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    cache: HashMap<K, V>,
    batch: Option<PendingBatch<K, V, E>>,
    next_generation: u64,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
}

/// The in-flight batch of keys accumulated by a `BatchingLoader` over a
/// bounded wait window. Not part of the public API; callers only ever see a
/// [`Thunk`].
struct PendingBatch<K, V, E> {
    generation: u64,
    keys: Vec<K>,
    waiters: Vec<Vec<oneshot::Sender<Result<V, LoadingError<E>>>>>,
    closing: bool,
}

impl<K, V, E> PendingBatch<K, V, E> {
    fn new(generation: u64) -> Self {
        PendingBatch { generation, keys: Vec::new(), waiters: Vec::new(), closing: false }
    }
}

/// A deferred load result returned by [`BatchingLoader::load_thunk`].
///
/// Resolving a `Thunk` for a cache hit is immediate; resolving one for a
/// cache miss blocks until the owning batch's fetch completes. This lets a
/// caller enqueue many loads (possibly across several loaders) before
/// blocking on any of them, mirroring spec.md §4.1's `LoadThunk`.
///
/// The inner representation is private so the loader's internal state type
/// never leaks into the public API.
pub struct Thunk<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    inner: ThunkInner<K, V, E>,
}

enum ThunkInner<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    Ready(Result<V, LoadingError<E>>),
    Pending { rx: oneshot::Receiver<Result<V, LoadingError<E>>>, key: K, state: Arc<Mutex<LoaderState<K, V, E>>> },
}

impl<K, V, E> Thunk<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    fn ready(result: Result<V, LoadingError<E>>) -> Self {
        Thunk { inner: ThunkInner::Ready(result) }
    }

    fn pending(
        rx: oneshot::Receiver<Result<V, LoadingError<E>>>,
        key: K,
        state: Arc<Mutex<LoaderState<K, V, E>>>,
    ) -> Self {
        Thunk { inner: ThunkInner::Pending { rx, key, state } }
    }

    /// Blocks until this thunk's batch has completed and returns the result
    /// for its key. On success, the value is written to the cache before
    /// being returned; on error, the cache is left untouched.
    pub async fn resolve(self) -> Result<V, LoadingError<E>> {
        match self.inner {
            ThunkInner::Ready(result) => result,
            ThunkInner::Pending { rx, key, state } => {
                let result = rx.await.expect(
                    "batching loader dropped the completion channel before the batch finished; this is a bug",
                );
                if let Ok(ref value) = result {
                    state.lock().unwrap().cache.insert(key, value.clone());
                }
                result
            }
        }
    }
}

impl<K, V, E> BatchingLoader<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    /// Creates a new `BatchingLoader`. `max_batch == 0` means unbounded (the
    /// size cap never fires and only the `wait` timer closes a batch).
    pub fn new<F>(fetcher: F, max_batch: usize, wait: Duration) -> Self
    where
        F: BatchFn<K, V, Error = E> + Send + Sync + 'static,
    {
        Self::with_label(fetcher, max_batch, wait, std::any::type_name::<F>())
    }

    /// Starts building a `BatchingLoader` around `fetcher`, following
    /// `ultra-batch`'s builder-style construction: `max_batch` defaults to
    /// unbounded (`0`) and `wait` defaults to 1ms until overridden.
    pub fn builder<F>(fetcher: F) -> BatchingLoaderBuilder<K, V, E, F>
    where
        F: BatchFn<K, V, Error = E> + Send + Sync + 'static,
    {
        BatchingLoaderBuilder { fetcher, max_batch: 0, wait: Duration::from_millis(1), label: None }
    }

    /// Like [`new`](Self::new), but tags tracing events emitted by this
    /// loader with `label` instead of the fetcher's type name.
    pub fn with_label<F>(fetcher: F, max_batch: usize, wait: Duration, label: impl Into<String>) -> Self
    where
        F: BatchFn<K, V, Error = E> + Send + Sync + 'static,
    {
        let label = label.into();
        BatchingLoader {
            state: Arc::new(Mutex::new(LoaderState {
                cache: HashMap::new(),
                batch: None,
                next_generation: 0,
                #[cfg(feature = "stats")]
                stats: WorkerStats::new(label.clone()),
            })),
            fetcher: Arc::new(fetcher),
            max_batch,
            wait,
            label,
        }
    }

    /// Loads a single value. Equivalent to `self.load_thunk(key).resolve().await`.
    #[tracing::instrument(skip(self), fields(loader = %self.label))]
    pub async fn load(&self, key: K) -> Result<V, LoadingError<E>> {
        self.load_thunk(key).resolve().await
    }

    /// Loads many values, preserving the order of `keys` in the result.
    #[tracing::instrument(skip(self, keys), fields(loader = %self.label, num_keys = keys.len()))]
    pub async fn load_all(&self, keys: Vec<K>) -> Vec<Result<V, LoadingError<E>>> {
        let thunks: Vec<_> = keys.into_iter().map(|key| self.load_thunk(key)).collect();
        let mut results = Vec::with_capacity(thunks.len());
        for thunk in thunks {
            results.push(thunk.resolve().await);
        }
        results
    }

    /// Enqueues `key` for loading and returns a handle to its eventual
    /// result without blocking on it. See spec.md §4.1 for the full
    /// batching algorithm this implements.
    pub fn load_thunk(&self, key: K) -> Thunk<K, V, E> {
        let mut guard = self.state.lock().unwrap();

        if let Some(value) = guard.cache.get(&key) {
            #[cfg(feature = "stats")]
            guard.stats.record_load_request(1, 1);
            tracing::trace!(loader = %self.label, ?key, "cache hit");
            return Thunk::ready(Ok(value.clone()));
        }

        #[cfg(feature = "stats")]
        guard.stats.record_load_request(1, 0);

        if guard.batch.is_none() {
            guard.next_generation = guard.next_generation.wrapping_add(1);
            let generation = guard.next_generation;
            guard.batch = Some(PendingBatch::new(generation));
        }

        let batch = guard.batch.as_mut().expect("batch was just ensured to exist");
        let (pos, newly_appended) = match batch.keys.iter().position(|existing| existing == &key) {
            Some(pos) => (pos, false),
            None => {
                batch.keys.push(key.clone());
                batch.waiters.push(Vec::new());
                (batch.keys.len() - 1, true)
            }
        };

        let (tx, rx) = oneshot::channel();
        batch.waiters[pos].push(tx);

        let schedule_timer = newly_appended && pos == 0;
        let hit_cap = newly_appended
            && !batch.closing
            && self.max_batch > 0
            && pos >= self.max_batch - 1;

        let detached_for_size_cap = if hit_cap {
            batch.closing = true;
            guard.batch.take()
        } else {
            None
        };

        let generation_for_timer = guard.batch.as_ref().map(|b| b.generation);

        drop(guard);

        if let Some(batch) = detached_for_size_cap {
            tracing::debug!(loader = %self.label, batch_size = batch.keys.len(), "batch reached max_batch, finalizing immediately");
            spawn_finalize(Arc::clone(&self.state), Arc::clone(&self.fetcher), self.label.clone(), batch);
        } else if schedule_timer {
            if let Some(generation) = generation_for_timer {
                spawn_timer(
                    Arc::clone(&self.state),
                    Arc::clone(&self.fetcher),
                    self.label.clone(),
                    generation,
                    self.wait,
                );
            }
        }

        Thunk::pending(rx, key, Arc::clone(&self.state))
    }

    /// Inserts `value` into the cache for `key`. If `force` is false, an
    /// existing cached value is left untouched and this returns `false`.
    /// Never triggers a fetch.
    pub fn prime(&self, key: K, value: V, force: bool) -> bool {
        let mut guard = self.state.lock().unwrap();
        if force || !guard.cache.contains_key(&key) {
            guard.cache.insert(key, value);
            true
        } else {
            false
        }
    }

    /// Removes `key` from the cache, if present. Has no effect on a batch
    /// that has already enqueued `key`; those waiters still receive the
    /// fetched value.
    pub fn clear(&self, key: &K) -> &Self {
        self.state.lock().unwrap().cache.remove(key);
        self
    }

    /// Removes every entry from the cache.
    pub fn clear_all(&self) -> &Self {
        self.state.lock().unwrap().cache.clear();
        self
    }

    /// A snapshot of this loader's batching/cache instrumentation. Only
    /// available with the `stats` feature.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> WorkerStats {
        self.state.lock().unwrap().stats.clone()
    }
}

/// Incrementally configures a [`BatchingLoader`], started from
/// [`BatchingLoader::builder`].
pub struct BatchingLoaderBuilder<K, V, E, F>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
    F: BatchFn<K, V, Error = E> + Send + Sync + 'static,
{
    fetcher: F,
    max_batch: usize,
    wait: Duration,
    label: Option<String>,
}

impl<K, V, E, F> BatchingLoaderBuilder<K, V, E, F>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
    F: BatchFn<K, V, Error = E> + Send + Sync + 'static,
{
    /// Sets the batch size cap. `0` (the default) means unbounded.
    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Sets the wait window a batch stays open for before it's dispatched.
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Tags tracing events emitted by this loader with `label` instead of
    /// the fetcher's type name.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn build(self) -> BatchingLoader<K, V, E> {
        match self.label {
            Some(label) => BatchingLoader::with_label(self.fetcher, self.max_batch, self.wait, label),
            None => BatchingLoader::new(self.fetcher, self.max_batch, self.wait),
        }
    }
}

fn spawn_timer<K, V, E>(
    state: Arc<Mutex<LoaderState<K, V, E>>>,
    fetcher: Arc<dyn BatchFn<K, V, Error = E> + Send + Sync>,
    label: String,
    generation: u64,
    wait: Duration,
) where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    tokio::spawn(async move {
        tokio::time::sleep(wait).await;

        let detached = {
            let mut guard = state.lock().unwrap();
            match &guard.batch {
                Some(batch) if batch.generation == generation && !batch.closing => {
                    let mut batch = guard.batch.take().expect("checked above");
                    batch.closing = true;
                    Some(batch)
                }
                _ => None,
            }
        };

        if let Some(batch) = detached {
            tracing::trace!(loader = %label, batch_size = batch.keys.len(), "wait window elapsed, finalizing batch");
            finalize(state, fetcher, label, batch).await;
        }
    });
}

fn spawn_finalize<K, V, E>(
    state: Arc<Mutex<LoaderState<K, V, E>>>,
    fetcher: Arc<dyn BatchFn<K, V, Error = E> + Send + Sync>,
    label: String,
    batch: PendingBatch<K, V, E>,
) where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    tokio::spawn(finalize(state, fetcher, label, batch));
}

/// Dispatches a detached batch to the fetcher and resolves every waiter.
/// Runs entirely outside the loader's lock; the lock is only reacquired
/// briefly afterwards (by `spawn_finalize`'s stats bump, if enabled).
async fn finalize<K, V, E>(
    state: Arc<Mutex<LoaderState<K, V, E>>>,
    fetcher: Arc<dyn BatchFn<K, V, Error = E> + Send + Sync>,
    label: String,
    batch: PendingBatch<K, V, E>,
) where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    #[cfg(not(feature = "stats"))]
    let _ = &state;

    let PendingBatch { keys, waiters, .. } = batch;
    tracing::debug!(loader = %label, num_keys = keys.len(), "dispatching batch to fetcher");
    let result = fetcher.load(&keys).await;

    if result.values.len() != keys.len() {
        tracing::error!(
            loader = %label,
            expected = keys.len(),
            got = result.values.len(),
            "fetcher violated its contract: wrong number of values returned",
        );
        let err = LoadingError::ContractViolation { expected: keys.len(), got: result.values.len() };
        for senders in waiters {
            for tx in senders {
                let _ = tx.send(Err(err.clone()));
            }
        }
        #[cfg(feature = "stats")]
        {
            let mut guard = state.lock().unwrap();
            guard.stats.record_batch(keys.len() as u64);
            guard.stats.record_contract_violation();
        }
        return;
    }

    for (pos, senders) in waiters.into_iter().enumerate() {
        let outcome: Result<V, LoadingError<E>> = match result.error_for(pos) {
            Some(err) => Err(LoadingError::Fetch(err.clone())),
            None => Ok(result.values[pos].clone()),
        };
        for tx in senders {
            let _ = tx.send(outcome.clone());
        }
    }

    #[cfg(feature = "stats")]
    {
        state.lock().unwrap().stats.record_batch(keys.len() as u64);
    }
}
