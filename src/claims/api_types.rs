//! Serde types matching the claims API requests and responses.
//!
//! These types are separate from domain types to allow lenient deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::Claim;

// ============================================================================
// Claims listing
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiClaim {
  pub id: Option<i64>,
  pub title: Option<String>,
  #[serde(alias = "authorUsername")]
  pub author_username: Option<String>,
  pub description: Option<String>,
  #[serde(default)]
  pub attachment: Option<Vec<String>>,
  #[serde(default)]
  pub fake: Option<i64>,
  #[serde(default)]
  pub upvote: Option<i64>,
  #[serde(default)]
  pub downvote: Option<i64>,
  /// Seconds since the Unix epoch, possibly fractional
  #[serde(alias = "dateCreated")]
  pub date_created: Option<f64>,
}

impl ApiClaim {
  /// Convert to a cached claim. Entries without an id, title or creation
  /// date cannot be stored and yield `None`.
  pub fn into_claim(self) -> Option<Claim> {
    let id = self.id?;
    let title = self.title?;
    let date_created = timestamp(self.date_created?)?;

    Some(Claim {
      id,
      title,
      author_username: self.author_username.unwrap_or_default(),
      description: self.description.unwrap_or_default(),
      attachment: self.attachment.and_then(|a| a.into_iter().next()),
      fake: self.fake.unwrap_or(0) != 0,
      upvote: self.upvote.unwrap_or(0),
      downvote: self.downvote.unwrap_or(0),
      date_created,
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimsResponse {
  #[serde(default)]
  pub data: Option<Vec<Option<ApiClaim>>>,
}

impl ClaimsResponse {
  /// Map the response to the batch of claims written into the cache.
  pub fn into_claims(self) -> Vec<Claim> {
    let entries = self.data.unwrap_or_default();
    let received = entries.len();

    let claims: Vec<Claim> = entries
      .into_iter()
      .flatten()
      .filter_map(ApiClaim::into_claim)
      .collect();

    if claims.len() < received {
      debug!(
        received,
        kept = claims.len(),
        "dropped incomplete claims from response"
      );
    }
    claims
  }
}

fn timestamp(seconds: f64) -> Option<DateTime<Utc>> {
  if !seconds.is_finite() {
    return None;
  }
  let whole = seconds.floor();
  let nanos = ((seconds - whole) * 1_000_000_000.0) as u32;
  DateTime::from_timestamp(whole as i64, nanos)
}

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
  pub username: String,
  pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
  #[serde(alias = "apiKey")]
  pub api_key: String,
  #[serde(default)]
  pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
  #[serde(default)]
  pub message: Option<String>,
  pub data: Option<LoginData>,
}

// ============================================================================
// Posting and voting
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PostClaimRequest {
  pub title: String,
  pub description: String,
  pub fake: bool,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub attachment: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostClaimResponse {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub data: Option<ApiClaim>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteResponse {
  #[serde(default)]
  pub message: Option<String>,
}
