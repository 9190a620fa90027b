use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A claim as stored in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
  pub id: i64,
  pub title: String,
  pub author_username: String,
  pub description: String,
  /// First attachment URL, if any
  pub attachment: Option<String>,
  /// Whether the claim has been judged fake
  pub fake: bool,
  pub upvote: i64,
  pub downvote: i64,
  pub date_created: DateTime<Utc>,
}

/// Parameters of a claims listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimRequest {
  /// Optional search keyword; `None` lists every claim
  pub keyword: Option<String>,
}

impl ClaimRequest {
  pub fn all() -> Self {
    Self::default()
  }

  pub fn search(keyword: impl Into<String>) -> Self {
    Self {
      keyword: Some(keyword.into()),
    }
  }
}
