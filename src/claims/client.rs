use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ApiConfig;
use crate::remote::{http, FailKind, Failure, RemoteOutcome};

use super::api_types::{
  ClaimsResponse, LoginRequest, LoginResponse, PostClaimRequest, PostClaimResponse, VoteResponse,
};
use super::types::ClaimRequest;

/// Claims API client. Every call is a single attempt that resolves to a
/// classified [`RemoteOutcome`].
#[derive(Clone)]
pub struct ClaimsClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: Option<String>,
}

impl ClaimsClient {
  pub fn new(config: &ApiConfig, api_key: Option<String>) -> Result<Self> {
    // A base without a trailing slash would lose its last segment on join
    let mut base = config.url.trim().to_string();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API url '{}': {}", config.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("cachebound/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_key,
    })
  }

  /// List claims, optionally filtered by keyword
  pub async fn get_all_claims(&self, request: &ClaimRequest) -> RemoteOutcome<ClaimsResponse> {
    let builder = self
      .request(Method::GET, "claims")
      .map(|b| match &request.keyword {
        Some(keyword) => b.query(&[("keyword", keyword)]),
        None => b,
      });
    self.send(builder).await
  }

  pub async fn upvote(&self, id: i64) -> RemoteOutcome<VoteResponse> {
    let builder = self.request(Method::POST, &format!("claims/{}/upvote", id));
    self.send(builder).await
  }

  pub async fn downvote(&self, id: i64) -> RemoteOutcome<VoteResponse> {
    let builder = self.request(Method::POST, &format!("claims/{}/downvote", id));
    self.send(builder).await
  }

  /// Exchange credentials for an API key
  pub async fn login(&self, request: &LoginRequest) -> RemoteOutcome<LoginResponse> {
    let builder = self
      .request(Method::POST, "login")
      .map(|b| b.json(request));
    self.send(builder).await
  }

  pub async fn post_claim(&self, request: &PostClaimRequest) -> RemoteOutcome<PostClaimResponse> {
    let builder = self
      .request(Method::POST, "claims")
      .map(|b| b.json(request));
    self.send(builder).await
  }

  fn request(&self, method: Method, path: &str) -> std::result::Result<RequestBuilder, Failure> {
    let url = self.base_url.join(path).map_err(|e| {
      Failure::new(
        FailKind::ClientError,
        format!("Invalid endpoint '{}': {}", path, e),
      )
    })?;

    let builder = self.http.request(method, url);
    Ok(match &self.api_key {
      Some(key) => builder.bearer_auth(key),
      None => builder,
    })
  }

  async fn send<R: DeserializeOwned>(
    &self,
    request: std::result::Result<RequestBuilder, Failure>,
  ) -> RemoteOutcome<R> {
    match request {
      Ok(builder) => http::send_json(builder).await,
      Err(failure) => RemoteOutcome::Fail(failure),
    }
  }
}
