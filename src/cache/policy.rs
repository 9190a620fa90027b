//! Fetch-decision policies.

use serde::Deserialize;

/// Decides whether cached data is sufficient or a remote refresh is needed.
///
/// The current snapshot is `None` when the cache holds nothing (including an
/// empty collection).
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
  /// Fetch only when the cache is empty
  #[default]
  IfEmpty,
  /// Always refresh from the remote
  Always,
  /// Never contact the remote; serve whatever is cached
  Never,
}

impl FetchPolicy {
  pub fn should_fetch<T>(&self, current: Option<&T>) -> bool {
    match self {
      Self::IfEmpty => current.is_none(),
      Self::Always => true,
      Self::Never => false,
    }
  }
}
