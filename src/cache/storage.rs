//! SQLite cache storage with live query views.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::stream::{self, BoxStream, StreamExt};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::traits::{Cacheable, QueryKey};

/// Result of a cached query lookup.
#[derive(Debug, Clone)]
pub struct CachedQueryResult<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the query result was cached
  pub cached_at: DateTime<Utc>,
}

/// SQLite-based cache storage.
///
/// Every committed write bumps a version counter for each query it touched;
/// live views returned by [`SqliteStorage::observe`] re-read their query
/// whenever its counter changes, so a write is visible to the next emission of
/// every open view of that query and wakes no other view.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  watchers: Mutex<HashMap<String, watch::Sender<u64>>>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the storage at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    debug!(path = %path.display(), "opened cache database");
    Self::with_connection(conn)
  }

  /// Open a private in-memory storage.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
      watchers: Mutex::new(HashMap::new()),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("cachebound").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Wake the live views of the given queries. Called only after a write has committed.
  fn notify<'a>(&self, query_hashes: impl IntoIterator<Item = &'a str>) {
    let watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
    for query_hash in query_hashes {
      if let Some(version) = watchers.get(query_hash) {
        version.send_modify(|v| *v += 1);
      }
    }
  }

  fn subscribe(&self, query_hash: &str) -> watch::Receiver<u64> {
    let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
    watchers.retain(|_, version| version.receiver_count() > 0);
    watchers
      .entry(query_hash.to_string())
      .or_insert_with(|| watch::channel(0).0)
      .subscribe()
  }

  /// Replace the result set of a query.
  pub fn store_query_result<T, K>(&self, key: &K, entities: &[T]) -> Result<()>
  where
    T: Cacheable,
    K: QueryKey + ?Sized,
  {
    let hash = key.cache_hash();
    {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
      write_query_result(&tx, &hash, &key.description(), entities)?;
      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    }

    debug!(query = %key.description(), count = entities.len(), "stored query result");
    self.notify([hash.as_str()]);
    Ok(())
  }

  /// Merge entities into a query result (upsert by cache key).
  ///
  /// Entities already in the result are updated in place; new ones are
  /// placed at the front in the order given.
  pub fn merge_query_result<T, K>(&self, key: &K, entities: &[T]) -> Result<()>
  where
    T: Cacheable,
    K: QueryKey + ?Sized,
  {
    let hash = key.cache_hash();
    let total = {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      let existing = read_entities::<T>(&tx, &hash)?;
      let merged = merge_entities(existing, entities);
      write_query_result(&tx, &hash, &key.description(), &merged)?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
      merged.len()
    };

    debug!(
      query = %key.description(),
      incoming = entities.len(),
      total,
      "merged query result"
    );
    self.notify([hash.as_str()]);
    Ok(())
  }

  /// Get the cached entities for a query, or `None` if it was never stored.
  pub fn get_query_result<T, K>(&self, key: &K) -> Result<Option<CachedQueryResult<T>>>
  where
    T: Cacheable,
    K: QueryKey + ?Sized,
  {
    self.read_query_result(&key.cache_hash())
  }

  fn read_query_result<T: Cacheable>(&self, query_hash: &str) -> Result<Option<CachedQueryResult<T>>> {
    let conn = self.lock()?;

    let cached_at: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM query_cache WHERE query_hash = ? AND entity_type = ?",
        params![query_hash, T::entity_type()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read query cache: {}", e))?;

    let cached_at = match cached_at {
      Some(s) => parse_datetime(&s)?,
      None => return Ok(None),
    };

    let entities = read_entities(&conn, query_hash)?;
    Ok(Some(CachedQueryResult {
      entities,
      cached_at,
    }))
  }

  /// Delete every cached entity of type `T` and the query results over them.
  pub fn clear_entity_type<T: Cacheable>(&self) -> Result<usize> {
    let entity_type = T::entity_type();
    let (removed, cleared) = {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      let cleared = query_hashes_of(&tx, entity_type)?;

      tx.execute(
        "DELETE FROM query_results WHERE query_hash IN
           (SELECT query_hash FROM query_cache WHERE entity_type = ?)",
        params![entity_type],
      )
      .map_err(|e| eyre!("Failed to delete query results: {}", e))?;

      tx.execute(
        "DELETE FROM query_cache WHERE entity_type = ?",
        params![entity_type],
      )
      .map_err(|e| eyre!("Failed to delete query cache: {}", e))?;

      let removed = tx
        .execute(
          "DELETE FROM entity_cache WHERE entity_type = ?",
          params![entity_type],
        )
        .map_err(|e| eyre!("Failed to delete entities: {}", e))?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
      (removed, cleared)
    };

    debug!(entity_type, removed, queries = cleared.len(), "cleared cached entities");
    self.notify(cleared.iter().map(String::as_str));
    Ok(removed)
  }

  /// Live view of a query.
  ///
  /// Emits the current result immediately, then again after every write to
  /// this query. A query that was never stored emits an empty `Vec`. The
  /// stream ends if a read fails.
  ///
  /// Reads run on tokio's blocking pool when polled inside a runtime, and
  /// inline on the polling thread otherwise.
  pub fn observe<T, K>(self: &Arc<Self>, key: &K) -> BoxStream<'static, Vec<T>>
  where
    T: Cacheable,
    K: QueryKey + ?Sized,
  {
    let query_hash = key.cache_hash();
    let view = LiveView {
      storage: Arc::clone(self),
      changes: self.subscribe(&query_hash),
      query_hash,
      description: key.description(),
      primed: false,
    };

    stream::unfold(view, |mut view| async move {
      if view.primed {
        view.changes.changed().await.ok()?;
      } else {
        // Anything written after this point triggers another read.
        let _ = view.changes.borrow_and_update();
        view.primed = true;
      }

      let storage = Arc::clone(&view.storage);
      let query_hash = view.query_hash.clone();
      let read = match Handle::try_current() {
        Ok(runtime) => runtime
          .spawn_blocking(move || storage.read_query_result::<T>(&query_hash))
          .await
          .map_err(|e| eyre!("Read task failed: {}", e))
          .and_then(|read| read),
        Err(_) => storage.read_query_result::<T>(&query_hash),
      };

      match read {
        Ok(result) => {
          let entities = result.map(|r| r.entities).unwrap_or_default();
          Some((entities, view))
        }
        Err(e) => {
          error!(query = %view.description, "live view read failed: {}", e);
          None
        }
      }
    })
    .fuse()
    .boxed()
  }
}

/// State carried between emissions of a live view.
struct LiveView {
  storage: Arc<SqliteStorage>,
  query_hash: String,
  description: String,
  changes: watch::Receiver<u64>,
  primed: bool,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, entity_key)
);

-- Query result tracking
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    result_count INTEGER NOT NULL
);

-- Query to entity mapping (preserves order)
CREATE TABLE IF NOT EXISTS query_results (
    query_hash TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (query_hash, entity_key),
    FOREIGN KEY (query_hash) REFERENCES query_cache(query_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_query_results_hash ON query_results(query_hash);
"#;

/// Write a full query result. Must run inside a transaction.
fn write_query_result<T: Cacheable>(
  conn: &Connection,
  query_hash: &str,
  description: &str,
  entities: &[T],
) -> Result<()> {
  let entity_type = T::entity_type();

  conn
    .execute(
      "DELETE FROM query_results WHERE query_hash = ?",
      params![query_hash],
    )
    .map_err(|e| eyre!("Failed to delete old query results: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO query_cache (query_hash, query_description, entity_type, cached_at, result_count)
       VALUES (?, ?, ?, datetime('now'), ?)",
      params![query_hash, description, entity_type, entities.len()],
    )
    .map_err(|e| eyre!("Failed to update query cache: {}", e))?;

  for (position, entity) in entities.iter().enumerate() {
    let entity_key = entity.cache_key();
    let data =
      serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![entity_type, entity_key, data],
      )
      .map_err(|e| eyre!("Failed to store entity: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO query_results (query_hash, entity_key, position)
         VALUES (?, ?, ?)",
        params![query_hash, entity_key, position],
      )
      .map_err(|e| eyre!("Failed to store query result: {}", e))?;
  }

  Ok(())
}

/// Read the entities of a query in stored order.
fn read_entities<T: Cacheable>(conn: &Connection, query_hash: &str) -> Result<Vec<T>> {
  let mut stmt = conn
    .prepare(
      "SELECT ec.entity_key, ec.data FROM entity_cache ec
       INNER JOIN query_results qr ON ec.entity_type = ? AND ec.entity_key = qr.entity_key
       WHERE qr.query_hash = ?
       ORDER BY qr.position",
    )
    .map_err(|e| eyre!("Failed to prepare entity query: {}", e))?;

  let rows: Vec<(String, Vec<u8>)> = stmt
    .query_map(params![T::entity_type(), query_hash], |row| {
      Ok((row.get(0)?, row.get(1)?))
    })
    .map_err(|e| eyre!("Failed to query entities: {}", e))?
    .collect::<rusqlite::Result<_>>()
    .map_err(|e| eyre!("Failed to read cached entities: {}", e))?;

  let entities = rows
    .into_iter()
    .filter_map(|(key, data)| match serde_json::from_slice(&data) {
      Ok(entity) => Some(entity),
      Err(e) => {
        warn!(entity_key = %key, "skipping undecodable cached entity: {}", e);
        None
      }
    })
    .collect();

  Ok(entities)
}

/// Hashes of the cached queries over an entity type.
fn query_hashes_of(conn: &Connection, entity_type: &str) -> Result<Vec<String>> {
  let mut stmt = conn
    .prepare("SELECT query_hash FROM query_cache WHERE entity_type = ?")
    .map_err(|e| eyre!("Failed to prepare query cache lookup: {}", e))?;

  let hashes = stmt
    .query_map(params![entity_type], |row| row.get(0))
    .map_err(|e| eyre!("Failed to list cached queries: {}", e))?
    .collect::<rusqlite::Result<Vec<String>>>()
    .map_err(|e| eyre!("Failed to list cached queries: {}", e))?;

  Ok(hashes)
}

/// Upsert `incoming` into `existing` by cache key.
fn merge_entities<T: Cacheable>(mut existing: Vec<T>, incoming: &[T]) -> Vec<T> {
  let existing_index: HashMap<String, usize> = existing
    .iter()
    .enumerate()
    .map(|(i, e)| (e.cache_key(), i))
    .collect();

  let mut fresh: Vec<T> = Vec::new();
  let mut fresh_index: HashMap<String, usize> = HashMap::new();

  for entity in incoming {
    let key = entity.cache_key();
    if let Some(&i) = existing_index.get(&key) {
      existing[i] = entity.clone();
    } else if let Some(&i) = fresh_index.get(&key) {
      fresh[i] = entity.clone();
    } else {
      fresh_index.insert(key, fresh.len());
      fresh.push(entity.clone());
    }
  }

  fresh.extend(existing);
  fresh
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};
  use std::time::Duration;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: u32,
    text: String,
  }

  impl Cacheable for Note {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "note"
    }
  }

  struct Key(&'static str);

  impl QueryKey for Key {
    fn canonical(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  fn note(id: u32, text: &str) -> Note {
    Note {
      id,
      text: text.to_string(),
    }
  }

  fn storage() -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::open_in_memory().unwrap())
  }

  #[test]
  fn test_missing_query_is_none() {
    let storage = storage();
    let result = storage.get_query_result::<Note, _>(&Key("notes")).unwrap();
    assert!(result.is_none());
  }

  #[test]
  fn test_store_replaces_result_set() {
    let storage = storage();
    let key = Key("notes");

    storage
      .store_query_result(&key, &[note(1, "a"), note(2, "b")])
      .unwrap();
    storage.store_query_result(&key, &[note(3, "c")]).unwrap();

    let result = storage.get_query_result::<Note, _>(&key).unwrap().unwrap();
    assert_eq!(result.entities, vec![note(3, "c")]);
    assert!(Utc::now() - result.cached_at < chrono::Duration::minutes(1));
  }

  #[test]
  fn test_empty_result_is_cached() {
    let storage = storage();
    let key = Key("notes");

    storage.store_query_result::<Note, _>(&key, &[]).unwrap();
    let result = storage.get_query_result::<Note, _>(&key).unwrap().unwrap();
    assert!(result.entities.is_empty());
  }

  #[test]
  fn test_merge_upserts_and_prepends_in_order() {
    let storage = storage();
    let key = Key("notes");

    storage
      .store_query_result(&key, &[note(1, "a"), note(2, "b")])
      .unwrap();
    storage
      .merge_query_result(&key, &[note(3, "c"), note(2, "b2"), note(4, "d")])
      .unwrap();

    let result = storage.get_query_result::<Note, _>(&key).unwrap().unwrap();
    assert_eq!(
      result.entities,
      vec![note(3, "c"), note(4, "d"), note(1, "a"), note(2, "b2")]
    );
  }

  #[test]
  fn test_merge_into_missing_query_keeps_batch_order() {
    let storage = storage();
    let key = Key("notes");

    storage
      .merge_query_result(&key, &[note(1, "a"), note(2, "b"), note(1, "a2")])
      .unwrap();

    let result = storage.get_query_result::<Note, _>(&key).unwrap().unwrap();
    assert_eq!(result.entities, vec![note(1, "a2"), note(2, "b")]);
  }

  #[test]
  fn test_clear_entity_type() {
    let storage = storage();
    storage
      .store_query_result(&Key("a"), &[note(1, "a"), note(2, "b")])
      .unwrap();
    storage.store_query_result(&Key("b"), &[note(3, "c")]).unwrap();

    let removed = storage.clear_entity_type::<Note>().unwrap();
    assert_eq!(removed, 3);
    assert!(storage.get_query_result::<Note, _>(&Key("a")).unwrap().is_none());
    assert!(storage.get_query_result::<Note, _>(&Key("b")).unwrap().is_none());
  }

  #[test]
  fn test_open_at_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    let storage = SqliteStorage::open_at(&path).unwrap();
    storage.store_query_result(&Key("notes"), &[note(1, "a")]).unwrap();
    drop(storage);

    let reopened = SqliteStorage::open_at(&path).unwrap();
    let result = reopened.get_query_result::<Note, _>(&Key("notes")).unwrap().unwrap();
    assert_eq!(result.entities, vec![note(1, "a")]);
  }

  #[tokio::test]
  async fn test_observe_emits_current_then_writes() {
    let storage = storage();
    let key = Key("notes");
    storage.store_query_result(&key, &[note(1, "a")]).unwrap();

    let mut view = storage.observe::<Note, _>(&key);
    assert_eq!(view.next().await, Some(vec![note(1, "a")]));

    storage.merge_query_result(&key, &[note(2, "b")]).unwrap();
    let next = tokio::time::timeout(Duration::from_secs(1), view.next())
      .await
      .unwrap();
    assert_eq!(next, Some(vec![note(2, "b"), note(1, "a")]));
  }

  #[tokio::test]
  async fn test_observe_unknown_query_emits_empty() {
    let storage = storage();
    let mut view = storage.observe::<Note, _>(&Key("nothing"));
    assert_eq!(view.next().await, Some(Vec::new()));
  }

  #[tokio::test]
  async fn test_concurrent_observers_all_see_write() {
    let storage = storage();
    let key = Key("notes");

    let mut first = storage.observe::<Note, _>(&key);
    let mut second = storage.observe::<Note, _>(&key);
    assert_eq!(first.next().await, Some(vec![]));
    assert_eq!(second.next().await, Some(vec![]));

    storage.store_query_result(&key, &[note(7, "x")]).unwrap();

    for view in [&mut first, &mut second] {
      let next = tokio::time::timeout(Duration::from_secs(1), view.next())
        .await
        .unwrap();
      assert_eq!(next, Some(vec![note(7, "x")]));
    }
  }

  #[tokio::test]
  async fn test_writes_only_wake_views_of_that_query() {
    let storage = storage();
    let mut notes = storage.observe::<Note, _>(&Key("notes"));
    let mut drafts = storage.observe::<Note, _>(&Key("drafts"));
    assert_eq!(notes.next().await, Some(vec![]));
    assert_eq!(drafts.next().await, Some(vec![]));

    storage.store_query_result(&Key("drafts"), &[note(1, "d")]).unwrap();
    let next = tokio::time::timeout(Duration::from_secs(1), drafts.next())
      .await
      .unwrap();
    assert_eq!(next, Some(vec![note(1, "d")]));

    let quiet = tokio::time::timeout(Duration::from_millis(50), notes.next()).await;
    assert!(quiet.is_err());

    // Clearing the entity type reaches every query over it
    storage.clear_entity_type::<Note>().unwrap();
    let next = tokio::time::timeout(Duration::from_secs(1), drafts.next())
      .await
      .unwrap();
    assert_eq!(next, Some(vec![]));
  }

  #[tokio::test]
  async fn test_read_failure_is_not_a_cache_miss() {
    let storage = storage();
    let key = Key("notes");
    storage.store_query_result(&key, &[note(1, "a")]).unwrap();
    storage
      .lock()
      .unwrap()
      .execute_batch("DROP TABLE query_results; DROP TABLE query_cache;")
      .unwrap();

    assert!(storage.get_query_result::<Note, _>(&key).is_err());

    let mut view = storage.observe::<Note, _>(&key);
    assert_eq!(view.next().await, None);
  }

  #[test]
  fn test_observe_reads_inline_outside_runtime() {
    let storage = storage();
    let key = Key("notes");
    storage.store_query_result(&key, &[note(1, "a")]).unwrap();

    let mut view = storage.observe::<Note, _>(&key);
    let first = futures::executor::block_on(view.next());
    assert_eq!(first, Some(vec![note(1, "a")]));
  }
}
