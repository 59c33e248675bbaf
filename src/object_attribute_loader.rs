use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::attribute_loader::AttributeLoader;
use crate::error::LoadingError;
use crate::tags::{Attribute, ObjectType};

type InitThunk<K, V, E> = Box<dyn FnOnce() -> AttributeLoader<K, V, E> + Send>;

/// Routes `(objectType, attribute, key)` loads to a lazily-constructed
/// [`AttributeLoader`] per object type. Mirrors spec.md §4.3; this is the
/// outermost, request-scoped entry point most embedders hold onto.
pub struct ObjectAttributeLoader<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    inner: Arc<Mutex<ObjState<K, V, E>>>,
}

struct ObjState<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    init: HashMap<ObjectType, Option<InitThunk<K, V, E>>>,
    loaders: HashMap<ObjectType, Arc<AttributeLoader<K, V, E>>>,
}

impl<K, V, E> ObjectAttributeLoader<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    /// Creates a new `ObjectAttributeLoader` from a map of
    /// `AttributeLoader`-producing thunks, one per object type, each
    /// invoked at most once.
    pub fn new(init_loaders: HashMap<ObjectType, InitThunk<K, V, E>>) -> Self {
        let init = init_loaders.into_iter().map(|(ty, thunk)| (ty, Some(thunk))).collect();
        ObjectAttributeLoader { inner: Arc::new(Mutex::new(ObjState { init, loaders: HashMap::new() })) }
    }

    /// Starts an empty `ObjectAttributeLoader`; object types can be added
    /// with [`ObjectAttributeLoaderBuilder::with_object_type`].
    pub fn builder() -> ObjectAttributeLoaderBuilder<K, V, E> {
        ObjectAttributeLoaderBuilder { init_loaders: HashMap::new() }
    }

    #[tracing::instrument(skip(self, key), fields(object_type = %object_type, attribute = %attribute))]
    pub async fn load(
        &self,
        object_type: &ObjectType,
        attribute: &Attribute,
        key: K,
    ) -> Result<V, LoadingError<E>> {
        let loader = self.resolve_loader(object_type)?;
        loader.load(attribute, key).await
    }

    #[tracing::instrument(skip(self, keys), fields(object_type = %object_type, attribute = %attribute, num_keys = keys.len()))]
    pub async fn load_all(
        &self,
        object_type: &ObjectType,
        attribute: &Attribute,
        keys: Vec<K>,
    ) -> Vec<Result<V, LoadingError<E>>> {
        match self.resolve_loader(object_type) {
            Ok(loader) => loader.load_all(attribute, keys).await,
            Err(err) => keys.iter().map(|_| Err(err.clone())).collect(),
        }
    }

    pub fn prime(&self, object_type: &ObjectType, attribute: &Attribute, key: K, value: V) -> bool {
        match self.resolve_loader(object_type) {
            Ok(loader) => loader.prime(attribute, key, value),
            Err(_) => false,
        }
    }

    pub fn force_prime(&self, object_type: &ObjectType, attribute: &Attribute, key: K, value: V) -> bool {
        match self.resolve_loader(object_type) {
            Ok(loader) => loader.force_prime(attribute, key, value),
            Err(_) => false,
        }
    }

    pub fn clear(&self, object_type: &ObjectType, attribute: &Attribute, key: &K) {
        if let Ok(loader) = self.resolve_loader(object_type) {
            loader.clear(attribute, key);
        }
    }

    fn resolve_loader(&self, object_type: &ObjectType) -> Result<Arc<AttributeLoader<K, V, E>>, LoadingError<E>> {
        let mut guard = self.inner.lock().unwrap();

        if let Some(loader) = guard.loaders.get(object_type) {
            return Ok(Arc::clone(loader));
        }

        let thunk = guard.init.get_mut(object_type).and_then(Option::take);
        match thunk {
            Some(thunk) => {
                tracing::debug!(object_type = %object_type, "lazily constructing attribute loader");
                let loader = Arc::new(thunk());
                guard.loaders.insert(object_type.clone(), Arc::clone(&loader));
                Ok(loader)
            }
            None => Err(LoadingError::ObjectTypeNotRegistered(object_type.clone())),
        }
    }
}

/// Incrementally builds an [`ObjectAttributeLoader`], registering one
/// object type's `AttributeLoader` thunk at a time.
pub struct ObjectAttributeLoaderBuilder<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    init_loaders: HashMap<ObjectType, InitThunk<K, V, E>>,
}

impl<K, V, E> ObjectAttributeLoaderBuilder<K, V, E>
where
    K: 'static + Clone + Eq + Hash + Debug + Send + Sync,
    V: 'static + Clone + Debug + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
{
    pub fn with_object_type<F>(mut self, object_type: impl Into<ObjectType>, init: F) -> Self
    where
        F: FnOnce() -> AttributeLoader<K, V, E> + Send + 'static,
    {
        self.init_loaders.insert(object_type.into(), Box::new(init));
        self
    }

    pub fn build(self) -> ObjectAttributeLoader<K, V, E> {
        ObjectAttributeLoader::new(self.init_loaders)
    }
}
