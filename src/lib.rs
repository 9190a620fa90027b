//! Cache-then-network resources.
//!
//! A [`NetworkBoundResource`](cache::NetworkBoundResource) serves a live view
//! of the local cache, decides per subscription whether the remote must be
//! consulted, runs at most one fetch, and writes the result back so every
//! open view of the cache updates. Progress is reported as a stream of
//! [`Resource`](resource::Resource) states.
//!
//! The `claims` module instantiates it for a fact-check claims API backed by
//! the SQLite cache in [`cache::SqliteStorage`].

pub mod cache;
pub mod claims;
pub mod config;
pub mod logging;
pub mod remote;
pub mod resource;

pub use cache::{FetchPolicy, NetworkBoundResource};
pub use remote::{FailKind, Failure, RemoteOutcome};
pub use resource::{Resource, Status};
