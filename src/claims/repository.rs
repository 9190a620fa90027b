//! Claims repository: the claims client combined with the local cache.

use std::sync::Arc;

use color_eyre::Result;
use futures::stream::BoxStream;
use tracing::info;

use crate::cache::{FetchPolicy, NetworkBoundResource, QueryKey, SqliteStorage};
use crate::remote::RemoteOutcome;
use crate::resource::Resource;

use super::api_types::{
  ClaimsResponse, LoginRequest, LoginResponse, PostClaimRequest, PostClaimResponse, VoteResponse,
};
use super::cache::ClaimsQueryKey;
use super::client::ClaimsClient;
use super::types::{Claim, ClaimRequest};

/// Claims data source with cache-then-network reads.
///
/// Listings are served from the local cache and refreshed from the remote
/// according to the fetch policy. Writes (votes, posts, login) go straight to
/// the remote.
#[derive(Clone)]
pub struct ClaimsRepository {
  client: ClaimsClient,
  storage: Arc<SqliteStorage>,
  policy: FetchPolicy,
}

impl ClaimsRepository {
  pub fn new(client: ClaimsClient, storage: Arc<SqliteStorage>, policy: FetchPolicy) -> Self {
    Self {
      client,
      storage,
      policy,
    }
  }

  /// Claims for a request as a sequence of resource states.
  ///
  /// The stream stays open and follows the cache after it settles on
  /// `Success`; it ends after an `Error`.
  pub fn get_all_claims(&self, request: ClaimRequest) -> BoxStream<'static, Resource<Vec<Claim>>> {
    self.claims_resource(request).as_stream()
  }

  fn claims_resource(&self, request: ClaimRequest) -> NetworkBoundResource<Vec<Claim>, ClaimsResponse> {
    let key = ClaimsQueryKey::from(&request);
    let label = key.description();

    let view = Arc::clone(&self.storage);
    let view_key = key.clone();

    let sink = Arc::clone(&self.storage);
    let sink_key = key;

    let policy = self.policy;
    let client = self.client.clone();

    NetworkBoundResource::new(
      move || view.observe::<Claim, _>(&view_key),
      move |current| policy.should_fetch(current),
      move || {
        let client = client.clone();
        let request = request.clone();
        async move { client.get_all_claims(&request).await }
      },
      move |response: ClaimsResponse| {
        let claims = response.into_claims();
        sink.merge_query_result(&sink_key, &claims)
      },
    )
    .with_label(label)
  }

  /// Remove every cached claim. Open listings re-emit with an empty cache.
  pub fn delete_local_claims(&self) -> Result<usize> {
    let removed = self.storage.clear_entity_type::<Claim>()?;
    info!(removed, "deleted local claims");
    Ok(removed)
  }

  pub async fn upvote_claim(&self, id: i64) -> RemoteOutcome<VoteResponse> {
    self.client.upvote(id).await
  }

  pub async fn downvote_claim(&self, id: i64) -> RemoteOutcome<VoteResponse> {
    self.client.downvote(id).await
  }

  pub async fn login(&self, request: &LoginRequest) -> RemoteOutcome<LoginResponse> {
    self.client.login(request).await
  }

  pub async fn post_claim(&self, request: &PostClaimRequest) -> RemoteOutcome<PostClaimResponse> {
    self.client.post_claim(request).await
  }
}
