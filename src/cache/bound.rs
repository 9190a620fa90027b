//! Network-bound resource: reconciles a live cached view with one remote fetch.
//!
//! A subscription runs as follows:
//!
//! 1. Wait for the first emission of the cached view and ask `should_fetch`.
//! 2. If no fetch is needed, every cache emission is forwarded as `Success`
//!    for as long as the subscriber listens.
//! 3. Otherwise emit `Loading` (with the cached data attached), run the fetch
//!    once, and keep forwarding cache emissions as `Loading` until it resolves.
//! 4. On success the payload is persisted on a blocking worker, then the cached
//!    view is re-subscribed and its emissions forwarded as `Success`.
//! 5. On failure a single `Error` carrying the last cached data is emitted and
//!    the sequence ends. There is no automatic retry.
//!
//! Dropping the stream stops cache observation immediately. An in-flight fetch
//! and its persist step keep running in the background and finish silently.
//!
//! The fetch runs as a tokio task. The resource remembers the runtime it was
//! built in (or one given with [`NetworkBoundResource::with_runtime`]), so its
//! stream can be polled from any executor. Without a runtime the subscription
//! ends with an `Error` instead of fetching.

use std::future::Future;
use std::sync::Arc;

use color_eyre::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::traits::Snapshot;
use crate::remote::{Failure, RemoteOutcome};
use crate::resource::Resource;

type LoadFn<T> = Arc<dyn Fn() -> BoxStream<'static, T> + Send + Sync>;
type ShouldFetchFn<T> = Arc<dyn Fn(Option<&T>) -> bool + Send + Sync>;
type FetchFn<R> = Arc<dyn Fn() -> BoxFuture<'static, RemoteOutcome<R>> + Send + Sync>;
type PersistFn<R> = Arc<dyn Fn(R) -> Result<()> + Send + Sync>;

/// Cache-then-network mediator for one logical request.
///
/// `T` is the cached view's snapshot type, `R` the remote payload type.
/// Built from four hooks:
///
/// - `load_from_cache`: returns a live view of the local store
/// - `should_fetch`: decides from the first snapshot whether to go remote;
///   receives `None` when the snapshot is empty
/// - `fetch`: performs exactly one remote attempt
/// - `persist`: writes a payload into the local store; runs on a blocking
///   worker, and its writes must show up in `load_from_cache` views
///
/// # Example
///
/// ```ignore
/// let storage = Arc::new(SqliteStorage::open()?);
/// let view = Arc::clone(&storage);
/// let sink = Arc::clone(&storage);
///
/// let resource = NetworkBoundResource::new(
///     move || view.observe::<Claim, _>(&ClaimsQueryKey::All),
///     |current| current.is_none(),
///     move || { let client = client.clone(); async move { client.get_all_claims(&request).await } },
///     move |response: ClaimsResponse| sink.merge_query_result(&ClaimsQueryKey::All, &response.into_claims()),
/// );
///
/// let mut states = resource.as_stream();
/// while let Some(state) = states.next().await { /* render */ }
/// ```
pub struct NetworkBoundResource<T, R> {
  load_from_cache: LoadFn<T>,
  should_fetch: ShouldFetchFn<T>,
  fetch: FetchFn<R>,
  persist: PersistFn<R>,
  label: Arc<str>,
  runtime: Option<Handle>,
}

impl<T, R> NetworkBoundResource<T, R>
where
  T: Snapshot + Clone + Send + 'static,
  R: Send + 'static,
{
  pub fn new<L, S, P, F, Fut, W>(load_from_cache: L, should_fetch: P, fetch: F, persist: W) -> Self
  where
    L: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
    P: Fn(Option<&T>) -> bool + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteOutcome<R>> + Send + 'static,
    W: Fn(R) -> Result<()> + Send + Sync + 'static,
  {
    Self {
      load_from_cache: Arc::new(move || load_from_cache().boxed()),
      should_fetch: Arc::new(should_fetch),
      fetch: Arc::new(move || fetch().boxed()),
      persist: Arc::new(persist),
      label: Arc::from("resource"),
      runtime: Handle::try_current().ok(),
    }
  }

  /// Name used in log output for this resource.
  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Arc::from(label.into());
    self
  }

  /// Runtime that fetch and persist tasks are spawned on.
  pub fn with_runtime(mut self, runtime: Handle) -> Self {
    self.runtime = Some(runtime);
    self
  }

  /// Start a new, independent subscription.
  ///
  /// Each call evaluates the fetch decision afresh and runs at most one fetch.
  /// The fetch needs a tokio runtime: the one captured when the resource was
  /// built, else the one polling the stream. If neither exists the stream
  /// emits `Loading` and then a terminal `Error`.
  pub fn as_stream(&self) -> BoxStream<'static, Resource<T>> {
    let run = Run {
      hooks: self.clone(),
      phase: Phase::Start,
    };

    stream::unfold(run, |mut run| async move {
      let state = run.step().await?;
      Some((state, run))
    })
    .fuse()
    .boxed()
  }

  /// Spawn the fetch and the persist step that follows it.
  ///
  /// The task is detached from the subscription: dropping the returned handle
  /// does not cancel it. Returns `None` when there is no runtime to spawn on.
  fn spawn_fetch(&self) -> Option<JoinHandle<Completion>> {
    let runtime = self
      .runtime
      .clone()
      .or_else(|| Handle::try_current().ok())?;

    let fetch = (self.fetch)();
    let persist = Arc::clone(&self.persist);
    let label = Arc::clone(&self.label);

    Some(runtime.spawn(async move {
      match fetch.await {
        RemoteOutcome::Ok(payload) => {
          let written = tokio::task::spawn_blocking(move || persist(payload)).await;
          match written {
            Ok(Ok(())) => {
              info!(resource = %label, "persisted remote payload");
              Completion::Refreshed
            }
            Ok(Err(e)) => {
              error!(resource = %label, "failed to persist remote payload: {}", e);
              Completion::PersistFailed(format!("Failed to save data: {}", e))
            }
            Err(e) => {
              error!(resource = %label, "persist task failed: {}", e);
              Completion::PersistFailed(format!("Failed to save data: {}", e))
            }
          }
        }
        RemoteOutcome::Empty => {
          debug!(resource = %label, "remote returned no payload");
          Completion::Refreshed
        }
        RemoteOutcome::Fail(failure) => {
          warn!(resource = %label, kind = %failure.kind, "fetch failed: {}", failure.message);
          Completion::Failed(failure)
        }
      }
    }))
  }
}

impl<T, R> Clone for NetworkBoundResource<T, R> {
  fn clone(&self) -> Self {
    Self {
      load_from_cache: Arc::clone(&self.load_from_cache),
      should_fetch: Arc::clone(&self.should_fetch),
      fetch: Arc::clone(&self.fetch),
      persist: Arc::clone(&self.persist),
      label: Arc::clone(&self.label),
      runtime: self.runtime.clone(),
    }
  }
}

/// How a fetch task ended.
enum Completion {
  /// Payload persisted, or nothing to persist
  Refreshed,
  Failed(Failure),
  PersistFailed(String),
}

enum Phase<T> {
  /// Nothing observed yet
  Start,
  /// Fetch in flight; cache emissions are reported as `Loading`
  Fetching {
    cache: Option<BoxStream<'static, T>>,
    task: JoinHandle<Completion>,
    latest: Option<T>,
  },
  /// Cache emissions are reported as `Success`
  Tracking(BoxStream<'static, T>),
  /// The fetch could not start; the error is reported next
  Failed {
    message: String,
    latest: Option<T>,
  },
  Done,
}

enum Event<T> {
  Cache(Option<T>),
  Finished(std::result::Result<Completion, JoinError>),
}

/// State of one subscription.
struct Run<T, R> {
  hooks: NetworkBoundResource<T, R>,
  phase: Phase<T>,
}

impl<T, R> Run<T, R>
where
  T: Snapshot + Clone + Send + 'static,
  R: Send + 'static,
{
  /// Produce the next state, or `None` when the sequence is over.
  async fn step(&mut self) -> Option<Resource<T>> {
    loop {
      match std::mem::replace(&mut self.phase, Phase::Done) {
        Phase::Start => {
          let mut cache = (self.hooks.load_from_cache)();
          let Some(snapshot) = cache.next().await else {
            debug!(resource = %self.hooks.label, "cached view closed before first emission");
            return None;
          };

          let latest = attach(snapshot.clone());
          if !(self.hooks.should_fetch)(latest.as_ref()) {
            debug!(resource = %self.hooks.label, "cache is sufficient, skipping fetch");
            self.phase = Phase::Tracking(cache);
            return Some(Resource::Success(snapshot));
          }

          debug!(resource = %self.hooks.label, "fetching from remote");
          let Some(task) = self.hooks.spawn_fetch() else {
            error!(resource = %self.hooks.label, "no tokio runtime to run the fetch on");
            self.phase = Phase::Failed {
              message: "No async runtime available to fetch data".to_string(),
              latest: latest.clone(),
            };
            return Some(Resource::Loading(latest));
          };
          self.phase = Phase::Fetching {
            cache: Some(cache),
            task,
            latest: latest.clone(),
          };
          return Some(Resource::Loading(latest));
        }

        Phase::Fetching {
          mut cache,
          mut task,
          latest,
        } => {
          // Completion wins ties so a fresh view is taken right after persist.
          let event = match cache.as_mut() {
            Some(view) => tokio::select! {
              biased;
              finished = &mut task => Event::Finished(finished),
              snapshot = view.next() => Event::Cache(snapshot),
            },
            None => Event::Finished((&mut task).await),
          };

          match event {
            Event::Cache(Some(snapshot)) => {
              let latest = attach(snapshot);
              self.phase = Phase::Fetching {
                cache,
                task,
                latest: latest.clone(),
              };
              return Some(Resource::Loading(latest));
            }
            Event::Cache(None) => {
              self.phase = Phase::Fetching {
                cache: None,
                task,
                latest,
              };
            }
            Event::Finished(Ok(Completion::Refreshed)) => {
              self.phase = Phase::Tracking((self.hooks.load_from_cache)());
            }
            Event::Finished(Ok(Completion::Failed(failure))) => {
              return Some(Resource::Error {
                message: failure.message,
                data: latest,
              });
            }
            Event::Finished(Ok(Completion::PersistFailed(message))) => {
              return Some(Resource::Error {
                message,
                data: latest,
              });
            }
            Event::Finished(Err(e)) => {
              error!(resource = %self.hooks.label, "fetch task failed: {}", e);
              return Some(Resource::Error {
                message: format!("Fetch task failed: {}", e),
                data: latest,
              });
            }
          }
        }

        Phase::Tracking(mut cache) => {
          let snapshot = cache.next().await?;
          self.phase = Phase::Tracking(cache);
          return Some(Resource::Success(snapshot));
        }

        Phase::Failed { message, latest } => {
          return Some(Resource::Error {
            message,
            data: latest,
          });
        }

        Phase::Done => return None,
      }
    }
  }
}

/// The snapshot as seen by `should_fetch` and attached to `Loading`/`Error`:
/// empty counts as absent.
fn attach<T: Snapshot>(snapshot: T) -> Option<T> {
  Some(snapshot).filter(|s| !s.is_empty())
}
