//! Addresses the N+1 problem in request-scoped data fetching through
//! batching, deduplication, and caching.
//!
//! Three layers build on each other:
//!
//! - [`BatchingLoader`] is the core: it coalesces single-key loads issued
//!   within a short wait window (or up to a batch size cap) into one fetch
//!   call, deduplicates repeated keys within a batch, and caches results for
//!   the life of the loader.
//! - [`AttributeLoader`] holds one `BatchingLoader` per attribute (e.g.
//!   `"id"`, `"email"`), constructing each lazily on first use, and can run a
//!   [`ValuePropagator`] after a successful load to seed sibling attributes'
//!   caches.
//! - [`ObjectAttributeLoader`] holds one `AttributeLoader` per object type
//!   (e.g. `"account"`, `"invoice"`), again constructed lazily, and is the
//!   entry point most embedders hold onto for the life of a request.
//!
//! None of the three layers evict entries; construct a fresh instance per
//! request and let it drop at the end of it.

mod attribute_loader;
mod batching_loader;
mod error;
mod fetcher;
mod object_attribute_loader;
mod tags;

#[cfg(feature = "stats")]
mod worker_stats;

pub use attribute_loader::{AttributeLoader, AttributeLoaderBuilder, ValuePropagator};
pub use batching_loader::{BatchingLoader, BatchingLoaderBuilder, Thunk};
pub use error::{is_loading_error, LoadingError};
pub use fetcher::{BatchFn, FetchResult};
pub use object_attribute_loader::{ObjectAttributeLoader, ObjectAttributeLoaderBuilder};
pub use tags::{Attribute, ObjectType};

#[cfg(feature = "stats")]
pub use worker_stats::WorkerStats;
