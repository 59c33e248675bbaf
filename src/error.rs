use crate::tags::{Attribute, ObjectType};

/// Errors surfaced by any of the three loader layers.
///
/// Two taxonomies live side by side: configuration errors
/// ([`LoadingError::ObjectTypeNotRegistered`], [`LoadingError::AttributeNotRegistered`])
/// describe routing mistakes made by the caller, while everything else
/// (including [`LoadingError::ContractViolation`]) originates from a fetch
/// attempt against the backend. Use [`is_loading_error`] to tell the two
/// apart without matching on every variant.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadingError<E> {
    /// The fetcher returned this error for the key (or it was the single
    /// shared error for the whole batch, per the fetcher's error-count
    /// convention).
    #[error("fetch failed: {0:?}")]
    Fetch(E),

    /// The fetcher's `values` sequence did not have one entry per requested
    /// key. This is a violation of the fetcher contract; spec.md permits
    /// undefined behavior here, but this crate always detects and reports
    /// it instead, since Rust has no implicit zero value for an arbitrary
    /// `V` to fall back on.
    #[error("fetcher returned {got} values for {expected} keys")]
    ContractViolation { expected: usize, got: usize },

    /// No [`AttributeLoader`](crate::AttributeLoader) exists (or can be
    /// lazily constructed) for the requested object type.
    #[error("object type not registered: {0}")]
    ObjectTypeNotRegistered(ObjectType),

    /// No [`BatchingLoader`](crate::BatchingLoader) exists (or can be
    /// lazily constructed) for the requested attribute.
    #[error("attribute not registered: {0}")]
    AttributeNotRegistered(Attribute),
}

/// Returns `true` for fetch-time failures, `false` for routing/configuration
/// errors (unregistered object type or attribute). Mirrors spec.md §4.4.
pub fn is_loading_error<E>(err: &LoadingError<E>) -> bool {
    !matches!(
        err,
        LoadingError::ObjectTypeNotRegistered(_) | LoadingError::AttributeNotRegistered(_)
    )
}
