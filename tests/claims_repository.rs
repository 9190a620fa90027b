//! Claims listings through the network-bound resource against a mock API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cachebound::cache::SqliteStorage;
use cachebound::claims::{Claim, ClaimRequest, ClaimsClient, ClaimsQueryKey, ClaimsRepository};
use cachebound::config::ApiConfig;
use cachebound::{FetchPolicy, RemoteOutcome, Resource};
use chrono::DateTime;
use common::{closed_port, MockApi, MockResponse};
use futures::stream::BoxStream;
use futures::StreamExt;

const TWO_CLAIMS: &str = r#"{
  "data": [
    {"id": 10, "title": "Moon is cheese", "author_username": "ann", "description": "",
     "attachment": [], "fake": 1, "upvote": 0, "downvote": 7, "date_created": 1700000000},
    {"id": 11, "title": "Sky is blue", "author_username": "ben", "description": "",
     "attachment": null, "fake": 0, "upvote": 5, "downvote": 0, "date_created": 1700000500}
  ]
}"#;

fn repository(base_url: &str, policy: FetchPolicy) -> (ClaimsRepository, Arc<SqliteStorage>) {
  let config = ApiConfig {
    url: base_url.to_string(),
    timeout_secs: 5,
  };
  let client = ClaimsClient::new(&config, Some("test-key".to_string())).unwrap();
  let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
  (
    ClaimsRepository::new(client, Arc::clone(&storage), policy),
    storage,
  )
}

fn claim(id: i64, title: &str) -> Claim {
  Claim {
    id,
    title: title.to_string(),
    author_username: "cached".to_string(),
    description: String::new(),
    attachment: None,
    fake: false,
    upvote: 0,
    downvote: 0,
    date_created: DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
  }
}

async fn next(states: &mut BoxStream<'static, Resource<Vec<Claim>>>) -> Option<Resource<Vec<Claim>>> {
  tokio::time::timeout(Duration::from_secs(5), states.next())
    .await
    .expect("stream stalled")
}

async fn settle(states: &mut BoxStream<'static, Resource<Vec<Claim>>>) -> Resource<Vec<Claim>> {
  loop {
    let state = next(states).await.expect("stream ended");
    if !state.is_loading() {
      return state;
    }
  }
}

fn ids(claims: &[Claim]) -> Vec<i64> {
  claims.iter().map(|c| c.id).collect()
}

#[tokio::test]
async fn test_empty_cache_fetches_and_serves_refreshed_claims() {
  let api = MockApi::start().await;
  api.enqueue(MockResponse::json(TWO_CLAIMS)).await;
  let (repository, storage) = repository(&api.base_url(), FetchPolicy::IfEmpty);

  let mut states = repository.get_all_claims(ClaimRequest::all());
  assert_eq!(next(&mut states).await, Some(Resource::Loading(None)));

  match settle(&mut states).await {
    Resource::Success(claims) => assert_eq!(ids(&claims), vec![10, 11]),
    other => panic!("expected success, got {:?}", other),
  }

  let cached = storage
    .get_query_result::<Claim, _>(&ClaimsQueryKey::All)
    .unwrap()
    .unwrap();
  assert_eq!(ids(&cached.entities), vec![10, 11]);

  let requests = api.requests().await;
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].method, "GET");
  assert_eq!(requests[0].path, "/api/claims");
  assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-key"));
}

#[tokio::test]
async fn test_cached_claims_are_served_without_request() {
  let api = MockApi::start().await;
  let (repository, storage) = repository(&api.base_url(), FetchPolicy::IfEmpty);
  storage
    .store_query_result(&ClaimsQueryKey::All, &[claim(1, "a"), claim(2, "b")])
    .unwrap();

  let mut states = repository.get_all_claims(ClaimRequest::all());
  match next(&mut states).await {
    Some(Resource::Success(claims)) => assert_eq!(ids(&claims), vec![1, 2]),
    other => panic!("expected success, got {:?}", other),
  }

  // A later write to the same cache flows through the open listing
  storage
    .merge_query_result(&ClaimsQueryKey::All, &[claim(3, "c")])
    .unwrap();
  match next(&mut states).await {
    Some(Resource::Success(claims)) => assert_eq!(ids(&claims), vec![3, 1, 2]),
    other => panic!("expected success, got {:?}", other),
  }

  assert!(api.requests().await.is_empty());
}

#[tokio::test]
async fn test_server_error_ends_listing_with_error() {
  let api = MockApi::start().await;
  api.enqueue(MockResponse::error(503, "maintenance")).await;
  let (repository, _storage) = repository(&api.base_url(), FetchPolicy::IfEmpty);

  let mut states = repository.get_all_claims(ClaimRequest::search("moon"));
  assert_eq!(next(&mut states).await, Some(Resource::Loading(None)));
  assert_eq!(
    next(&mut states).await,
    Some(Resource::error("maintenance", None))
  );
  assert_eq!(next(&mut states).await, None);

  let requests = api.requests().await;
  assert_eq!(requests[0].query.as_deref(), Some("keyword=moon"));
}

#[tokio::test]
async fn test_unreachable_api_keeps_cached_data_in_error() {
  let base_url = format!("http://127.0.0.1:{}/api", closed_port());
  let (repository, storage) = repository(&base_url, FetchPolicy::Always);
  storage
    .store_query_result(&ClaimsQueryKey::All, &[claim(1, "a")])
    .unwrap();

  let mut states = repository.get_all_claims(ClaimRequest::all());
  assert!(next(&mut states).await.unwrap().is_loading());

  match next(&mut states).await {
    Some(Resource::Error { data, .. }) => assert_eq!(ids(&data.unwrap()), vec![1]),
    other => panic!("expected error, got {:?}", other),
  }
}

#[tokio::test]
async fn test_delete_local_claims_updates_open_listing() {
  let api = MockApi::start().await;
  let (repository, storage) = repository(&api.base_url(), FetchPolicy::Never);
  storage
    .store_query_result(&ClaimsQueryKey::All, &[claim(1, "a")])
    .unwrap();

  let mut states = repository.get_all_claims(ClaimRequest::all());
  assert!(next(&mut states).await.unwrap().is_success());

  assert_eq!(repository.delete_local_claims().unwrap(), 1);
  assert_eq!(next(&mut states).await, Some(Resource::Success(vec![])));
}

#[tokio::test]
async fn test_votes_pass_through_to_api() {
  let api = MockApi::start().await;
  api.enqueue(MockResponse::json(r#"{"message": "upvoted"}"#)).await;
  api.enqueue(MockResponse::error(404, "claim not found")).await;
  let (repository, _storage) = repository(&api.base_url(), FetchPolicy::IfEmpty);

  match repository.upvote_claim(5).await {
    RemoteOutcome::Ok(response) => assert_eq!(response.message.as_deref(), Some("upvoted")),
    other => panic!("expected ok, got {:?}", other),
  }

  match repository.downvote_claim(6).await {
    RemoteOutcome::Fail(failure) => {
      assert_eq!(failure.kind, cachebound::FailKind::ClientError);
      assert_eq!(failure.message, "claim not found");
    }
    other => panic!("expected failure, got {:?}", other),
  }

  let requests = api.requests().await;
  assert_eq!(requests[0].method, "POST");
  assert_eq!(requests[0].path, "/api/claims/5/upvote");
  assert_eq!(requests[1].path, "/api/claims/6/downvote");
}
