//! Core traits for cached entities, query keys and snapshots.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// Trait for entities that can be cached.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this entity (e.g., claim id)
  fn cache_key(&self) -> String;

  /// Entity type name for storage organization (e.g., "claim")
  fn entity_type() -> &'static str;
}

/// Identifies one logical query against the local store.
pub trait QueryKey: Send + Sync {
  /// Canonical form of the query; equal inputs must yield equal strings.
  fn canonical(&self) -> String;

  /// Human-readable description, stored alongside the cached result.
  fn description(&self) -> String;

  /// Stable, fixed-length hash used as the storage key.
  fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A value read from the cache that may hold nothing.
///
/// An empty snapshot is treated the same as an absent one when deciding
/// whether to fetch and when attaching data to `Loading`/`Error` states.
pub trait Snapshot {
  fn is_empty(&self) -> bool;
}

impl<T> Snapshot for Vec<T> {
  fn is_empty(&self) -> bool {
    Vec::is_empty(self)
  }
}

impl<T> Snapshot for Option<T> {
  fn is_empty(&self) -> bool {
    self.is_none()
  }
}

impl Snapshot for String {
  fn is_empty(&self) -> bool {
    String::is_empty(self)
  }
}
