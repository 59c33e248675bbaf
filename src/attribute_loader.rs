use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::batching_loader::BatchingLoader;
use crate::error::LoadingError;
use crate::tags::Attribute;

/// Invoked synchronously after a `Load` under `attribute` succeeds, so the
/// loaded value can seed sibling attributes' caches (spec.md §4.2). The
/// typical implementation calls `loader.prime(other_attribute, derived_key,
/// value.clone())`.
pub trait ValuePropagator<K, V, E>: Send + Sync
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    fn propagate(&self, value: &V, loader: &AttributeLoader<K, V, E>);
}

impl<K, V, E, F> ValuePropagator<K, V, E> for F
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
    F: Fn(&V, &AttributeLoader<K, V, E>) + Send + Sync,
{
    fn propagate(&self, value: &V, loader: &AttributeLoader<K, V, E>) {
        (self)(value, loader)
    }
}

type InitThunk<K, V, E> = Box<dyn FnOnce() -> BatchingLoader<K, V, E> + Send>;

/// Routes `(attribute, key)` loads to a lazily-constructed
/// [`BatchingLoader`] per attribute, and runs that attribute's registered
/// [`ValuePropagator`] (if any) after every successful single-key load.
/// Mirrors spec.md §4.2.
pub struct AttributeLoader<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    inner: Arc<Mutex<AttrState<K, V, E>>>,
}

struct AttrState<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    init: HashMap<Attribute, Option<InitThunk<K, V, E>>>,
    loaders: HashMap<Attribute, Arc<BatchingLoader<K, V, E>>>,
    propagators: HashMap<Attribute, Arc<dyn ValuePropagator<K, V, E>>>,
}

impl<K, V, E> AttributeLoader<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    /// Creates a new `AttributeLoader`. `init_loaders` supplies a
    /// BatchingLoader-producing thunk per attribute, invoked at most once,
    /// the first time that attribute is touched. `propagators` registers a
    /// [`ValuePropagator`] per attribute; attributes with no propagator
    /// simply don't seed any sibling cache.
    pub fn new(
        init_loaders: HashMap<Attribute, InitThunk<K, V, E>>,
        propagators: HashMap<Attribute, Arc<dyn ValuePropagator<K, V, E>>>,
    ) -> Self {
        let init = init_loaders.into_iter().map(|(attr, thunk)| (attr, Some(thunk))).collect();
        AttributeLoader {
            inner: Arc::new(Mutex::new(AttrState { init, loaders: HashMap::new(), propagators })),
        }
    }

    /// Starts an empty `AttributeLoader` with no attributes registered yet;
    /// attributes can be added with [`AttributeLoaderBuilder::with_attribute`].
    pub fn builder() -> AttributeLoaderBuilder<K, V, E> {
        AttributeLoaderBuilder { init_loaders: HashMap::new(), propagators: HashMap::new() }
    }

    /// Loads a single value for `attribute`/`key`, running that attribute's
    /// propagator synchronously on success.
    #[tracing::instrument(skip(self, key), fields(attribute = %attribute))]
    pub async fn load(&self, attribute: &Attribute, key: K) -> Result<V, LoadingError<E>> {
        let loader = self.resolve_loader(attribute)?;
        let result = loader.load(key).await;
        if let Ok(ref value) = result {
            self.run_propagator(attribute, value);
        }
        result
    }

    /// Loads many values for `attribute`, running the propagator once per
    /// successfully loaded value (spec.md §9's resolution of the LoadAll
    /// propagator-iteration ambiguity: skip values whose paired error is
    /// non-nil).
    #[tracing::instrument(skip(self, keys), fields(attribute = %attribute, num_keys = keys.len()))]
    pub async fn load_all(&self, attribute: &Attribute, keys: Vec<K>) -> Vec<Result<V, LoadingError<E>>> {
        let loader = match self.resolve_loader(attribute) {
            Ok(loader) => loader,
            Err(err) => return keys.iter().map(|_| Err(err.clone())).collect(),
        };

        let results = loader.load_all(keys).await;
        for result in &results {
            if let Ok(value) = result {
                self.run_propagator(attribute, value);
            }
        }
        results
    }

    /// Seeds the cache for `attribute`/`key` with `value` if absent. Returns
    /// `false` (and does nothing) if `attribute` has no initializer and no
    /// constructed loader.
    pub fn prime(&self, attribute: &Attribute, key: K, value: V) -> bool {
        match self.resolve_loader(attribute) {
            Ok(loader) => loader.prime(key, value, false),
            Err(_) => false,
        }
    }

    /// Like [`prime`](Self::prime), but overwrites an existing cache entry.
    pub fn force_prime(&self, attribute: &Attribute, key: K, value: V) -> bool {
        match self.resolve_loader(attribute) {
            Ok(loader) => loader.prime(key, value, true),
            Err(_) => false,
        }
    }

    /// Clears `key` from `attribute`'s cache, if that attribute has a loader.
    pub fn clear(&self, attribute: &Attribute, key: &K) {
        if let Ok(loader) = self.resolve_loader(attribute) {
            loader.clear(key);
        }
    }

    fn run_propagator(&self, attribute: &Attribute, value: &V) {
        let propagator = {
            let guard = self.inner.lock().unwrap();
            guard.propagators.get(attribute).cloned()
        };
        if let Some(propagator) = propagator {
            tracing::trace!(attribute = %attribute, "running value propagator");
            propagator.propagate(value, self);
        }
    }

    /// Returns the `BatchingLoader` for `attribute`, constructing it from
    /// its registered initializer thunk on first use. The thunk runs inside
    /// this loader's mutex and is consumed exactly once, even if invoked
    /// again after some other error path.
    fn resolve_loader(&self, attribute: &Attribute) -> Result<Arc<BatchingLoader<K, V, E>>, LoadingError<E>> {
        let mut guard = self.inner.lock().unwrap();

        if let Some(loader) = guard.loaders.get(attribute) {
            return Ok(Arc::clone(loader));
        }

        let thunk = guard.init.get_mut(attribute).and_then(Option::take);
        match thunk {
            Some(thunk) => {
                tracing::debug!(attribute = %attribute, "lazily constructing batching loader");
                let loader = Arc::new(thunk());
                guard.loaders.insert(attribute.clone(), Arc::clone(&loader));
                Ok(loader)
            }
            None => Err(LoadingError::AttributeNotRegistered(attribute.clone())),
        }
    }
}

/// Incrementally builds an [`AttributeLoader`], registering one attribute
/// (with its initializer thunk and optional propagator) at a time.
pub struct AttributeLoaderBuilder<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    init_loaders: HashMap<Attribute, InitThunk<K, V, E>>,
    propagators: HashMap<Attribute, Arc<dyn ValuePropagator<K, V, E>>>,
}

impl<K, V, E> AttributeLoaderBuilder<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    pub fn with_attribute<F>(mut self, attribute: impl Into<Attribute>, init: F) -> Self
    where
        F: FnOnce() -> BatchingLoader<K, V, E> + Send + 'static,
    {
        self.init_loaders.insert(attribute.into(), Box::new(init));
        self
    }

    pub fn with_propagator(
        mut self,
        attribute: impl Into<Attribute>,
        propagator: impl ValuePropagator<K, V, E> + 'static,
    ) -> Self {
        self.propagators.insert(attribute.into(), Arc::new(propagator));
        self
    }

    pub fn build(self) -> AttributeLoader<K, V, E> {
        AttributeLoader::new(self.init_loaders, self.propagators)
    }
}
