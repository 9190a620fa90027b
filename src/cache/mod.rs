//! Generic caching layer for data persistence and offline support.
//!
//! This module provides a domain-agnostic cache-then-network mechanism that:
//! - Stores entities with a stable key in SQLite, grouped into ordered query results
//! - Exposes each query as a live view that re-emits after every write
//! - Reconciles a live view with a single remote fetch per subscription,
//!   reporting progress as [`Resource`](crate::resource::Resource) states

pub mod bound;
mod policy;
mod storage;
mod traits;

pub use bound::NetworkBoundResource;
pub use policy::FetchPolicy;
pub use storage::{CachedQueryResult, SqliteStorage};
pub use traits::{Cacheable, QueryKey, Snapshot};
