//! Caching implementations for claim types.

use crate::cache::{Cacheable, QueryKey};

use super::types::{Claim, ClaimRequest};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Claim {
  fn cache_key(&self) -> String {
    self.id.to_string()
  }

  fn entity_type() -> &'static str {
    "claim"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for claim listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimsQueryKey {
  /// Every claim
  All,
  /// Claims matching a keyword
  Search { keyword: String },
}

impl From<&ClaimRequest> for ClaimsQueryKey {
  fn from(request: &ClaimRequest) -> Self {
    match request.keyword.as_deref().map(normalize_keyword) {
      Some(keyword) if !keyword.is_empty() => Self::Search { keyword },
      _ => Self::All,
    }
  }
}

impl QueryKey for ClaimsQueryKey {
  fn canonical(&self) -> String {
    match self {
      Self::All => "claims:all".to_string(),
      Self::Search { keyword } => format!("claims:search:{}", keyword),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::All => "all claims".to_string(),
      Self::Search { keyword } => format!("claims matching '{}'", keyword),
    }
  }
}

/// Normalize a keyword for consistent hashing.
/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize_keyword(keyword: &str) -> String {
  keyword.trim().to_lowercase()
}
