use async_trait::async_trait;

/// The embedder-supplied callback that turns a slice of keys into the
/// positional `(values, errors)` pair described in spec.md §4.1.
///
/// Unlike `dataload-rs`'s original `BatchFunction`, which returned a sparse
/// `Vec<(K, V)>` and took a separate `Context` type parameter, `BatchFn` is
/// a trait object boundary: each attribute of an
/// [`AttributeLoader`](crate::AttributeLoader) can hold its own
/// `Arc<dyn BatchFn<K, V, Error = E>>`, so embedders reach for whatever
/// shared state they need (a connection pool, an HTTP client) via the
/// implementing type's own fields instead of a generic context parameter.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    /// The error type returned for failed keys. Must be `Clone` because a
    /// single shared error (see [`FetchResult`]) is handed out to every
    /// waiter in the batch.
    type Error: Send + Sync + Clone + std::fmt::Debug + 'static;

    /// Fetch values for `keys`, which are unique and in the order they were
    /// first enqueued into the batch.
    async fn load(&self, keys: &[K]) -> FetchResult<V, Self::Error>;
}

/// The result of one batch fetch.
///
/// `values` must have one entry per key in `keys` (a violation of this is
/// reported via [`LoadingError::ContractViolation`](crate::LoadingError::ContractViolation)
/// rather than treated as undefined behavior). `errors` follows the
/// shared-error convention from spec.md §4.1, translating the original's
/// "nil-or-error" positional slot into `Option<E>` since Rust has no
/// implicit nil for an arbitrary `E`:
///
/// - empty: no key in this batch failed,
/// - exactly one element: that error, if `Some`, is shared by every key in
///   the batch,
/// - one element per key: `errors[i]` applies to `keys[i]` — `Some(e)` means
///   that key failed with `e`, `None` means it succeeded.
#[derive(Debug, Clone)]
pub struct FetchResult<V, E> {
    pub values: Vec<V>,
    pub errors: Vec<Option<E>>,
}

impl<V, E> FetchResult<V, E> {
    /// General constructor. Prefer [`ok`](Self::ok), [`shared_error`](Self::shared_error),
    /// or [`partial`](Self::partial) where they fit; this is the escape
    /// hatch for callers building `errors` some other way.
    pub fn new(values: Vec<V>, errors: Vec<Option<E>>) -> Self {
        FetchResult { values, errors }
    }

    /// Every key in the batch succeeded.
    pub fn ok(values: Vec<V>) -> Self {
        FetchResult { values, errors: Vec::new() }
    }

    /// Every key in the batch failed with the same `error`.
    pub fn shared_error(values: Vec<V>, error: E) -> Self {
        FetchResult { values, errors: vec![Some(error)] }
    }

    /// Per-key outcomes: `errors[i]` is `Some(e)` if `keys[i]` failed with
    /// `e`, `None` if it succeeded. Must be the same length as `keys`.
    pub fn partial(values: Vec<V>, errors: Vec<Option<E>>) -> Self {
        FetchResult { values, errors }
    }

    /// Resolves the error (if any) that applies to the key at `pos`, per the
    /// shared-error convention.
    pub fn error_for(&self, pos: usize) -> Option<&E> {
        match self.errors.len() {
            0 => None,
            1 => self.errors[0].as_ref(),
            _ => self.errors.get(pos).and_then(Option::as_ref),
        }
    }
}
