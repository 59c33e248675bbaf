use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dataload_rs::{BatchFn, BatchingLoader, FetchResult, LoadingError};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fetched(String);

/// Records every batch it's asked to fetch, so tests can assert on how
/// calls got grouped.
struct RecordingFetcher {
    calls: Arc<AsyncMutex<Vec<Vec<i64>>>>,
    fail_on: Vec<i64>,
    shared_error: bool,
    wrong_length: bool,
}

impl RecordingFetcher {
    fn new() -> (Self, Arc<AsyncMutex<Vec<Vec<i64>>>>) {
        let calls = Arc::new(AsyncMutex::new(Vec::new()));
        (
            Self { calls: Arc::clone(&calls), fail_on: Vec::new(), shared_error: false, wrong_length: false },
            calls,
        )
    }
}

#[async_trait]
impl BatchFn<i64, Fetched> for RecordingFetcher {
    type Error = String;

    async fn load(&self, keys: &[i64]) -> FetchResult<Fetched, String> {
        self.calls.lock().await.push(keys.to_vec());

        if self.wrong_length {
            let values = keys.iter().map(|k| Fetched(k.to_string())).take(keys.len() - 1).collect();
            return FetchResult::ok(values);
        }

        if self.shared_error {
            let values = keys.iter().map(|k| Fetched(k.to_string())).collect();
            return FetchResult::shared_error(values, "boom".to_owned());
        }

        if !self.fail_on.is_empty() {
            let errors: Vec<Option<String>> =
                keys.iter().map(|k| self.fail_on.contains(k).then(|| "boom".to_owned())).collect();
            let values = keys.iter().map(|k| Fetched(k.to_string())).collect();
            return FetchResult::partial(values, errors);
        }

        FetchResult::ok(keys.iter().map(|k| Fetched(k.to_string())).collect())
    }
}

#[tokio::test]
async fn load_returns_fetched_value() {
    let (fetcher, _calls) = RecordingFetcher::new();
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    assert_eq!(loader.load(1).await, Ok(Fetched("1".to_owned())));
}

#[tokio::test]
async fn repeated_load_hits_cache_after_first_fetch() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    assert_eq!(loader.load(1).await, Ok(Fetched("1".to_owned())));
    assert_eq!(loader.load(1).await, Ok(Fetched("1".to_owned())));

    assert_eq!(calls.lock().await.len(), 1);
}

#[tokio::test]
async fn concurrent_loads_for_the_same_key_dedupe_into_one_slot() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = Arc::new(BatchingLoader::new(fetcher, 0, Duration::from_millis(20)));

    let a = loader.load(7);
    let b = loader.load(7);
    let c = loader.load(9);

    let (ra, rb, rc) = tokio::join!(a, b, c);
    assert_eq!(ra, Ok(Fetched("7".to_owned())));
    assert_eq!(rb, Ok(Fetched("7".to_owned())));
    assert_eq!(rc, Ok(Fetched("9".to_owned())));

    let calls = calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![7, 9]);
}

#[tokio::test(start_paused = true)]
async fn wait_window_batches_keys_enqueued_before_it_elapses() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = Arc::new(BatchingLoader::new(fetcher, 0, Duration::from_millis(10)));

    let t1 = loader.load_thunk(1);
    let t2 = loader.load_thunk(2);

    tokio::time::advance(Duration::from_millis(11)).await;

    assert_eq!(t1.resolve().await, Ok(Fetched("1".to_owned())));
    assert_eq!(t2.resolve().await, Ok(Fetched("2".to_owned())));

    let calls = calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn size_cap_closes_a_batch_before_the_wait_window_elapses() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = Arc::new(BatchingLoader::new(fetcher, 2, Duration::from_secs(60)));

    let t1 = loader.load_thunk(1);
    let t2 = loader.load_thunk(2);
    let t3 = loader.load_thunk(3);

    assert_eq!(t1.resolve().await, Ok(Fetched("1".to_owned())));
    assert_eq!(t2.resolve().await, Ok(Fetched("2".to_owned())));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(t3.resolve().await, Ok(Fetched("3".to_owned())));

    let calls = calls.lock().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], vec![1, 2]);
    assert_eq!(calls[1], vec![3]);
}

#[tokio::test]
async fn contract_violation_is_reported_to_every_waiter() {
    let (mut fetcher, _calls) = RecordingFetcher::new();
    fetcher.wrong_length = true;
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    let results = loader.load_all(vec![1, 2, 3]).await;
    for result in results {
        assert!(matches!(result, Err(LoadingError::ContractViolation { expected: 3, got: 2 })));
    }
}

#[tokio::test]
async fn shared_error_applies_to_every_key_in_the_batch() {
    let (mut fetcher, _calls) = RecordingFetcher::new();
    fetcher.shared_error = true;
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    let results = loader.load_all(vec![1, 2, 3]).await;
    for result in results {
        assert!(matches!(result, Err(LoadingError::Fetch(ref e)) if e == "boom"));
    }
}

#[tokio::test]
async fn positional_errors_only_apply_to_their_own_key() {
    let (mut fetcher, _calls) = RecordingFetcher::new();
    fetcher.fail_on = vec![2];
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    let results = loader.load_all(vec![1, 2, 3]).await;
    assert_eq!(results[0], Ok(Fetched("1".to_owned())));
    assert!(matches!(results[1], Err(LoadingError::Fetch(ref e)) if e == "boom"));
    assert_eq!(results[2], Ok(Fetched("3".to_owned())));
}

#[tokio::test]
async fn prime_seeds_the_cache_without_invoking_the_fetcher() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    assert!(loader.prime(1, Fetched("primed".to_owned()), false));
    assert_eq!(loader.load(1).await, Ok(Fetched("primed".to_owned())));
    assert_eq!(calls.lock().await.len(), 0);
}

#[tokio::test]
async fn prime_does_not_overwrite_an_existing_entry_unless_forced() {
    let (fetcher, _calls) = RecordingFetcher::new();
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    assert!(loader.prime(1, Fetched("first".to_owned()), false));
    assert!(!loader.prime(1, Fetched("second".to_owned()), false));
    assert_eq!(loader.load(1).await, Ok(Fetched("first".to_owned())));

    assert!(loader.prime(1, Fetched("forced".to_owned()), true));
    assert_eq!(loader.load(1).await, Ok(Fetched("forced".to_owned())));
}

#[tokio::test]
async fn clear_evicts_a_key_so_the_next_load_refetches() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    assert_eq!(loader.load(1).await, Ok(Fetched("1".to_owned())));
    loader.clear(&1);
    assert_eq!(loader.load(1).await, Ok(Fetched("1".to_owned())));

    assert_eq!(calls.lock().await.len(), 2);
}

#[tokio::test]
async fn clear_all_evicts_every_key() {
    let (fetcher, calls) = RecordingFetcher::new();
    let loader = BatchingLoader::new(fetcher, 0, Duration::from_millis(5));

    loader.load_all(vec![1, 2]).await;
    loader.clear_all();
    loader.load_all(vec![1, 2]).await;

    assert_eq!(calls.lock().await.len(), 2);
}
