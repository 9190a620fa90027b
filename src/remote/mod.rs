//! Outcome of a single remote fetch attempt.
//!
//! A fetch resolves to exactly one [`RemoteOutcome`]. Failures are classified
//! by [`FailKind`] so callers can decide how to present them, but the
//! network-bound resource itself treats every failure the same way.

pub mod http;

use std::fmt;

use thiserror::Error;

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailKind {
  /// The remote could not be reached (DNS, refused connection, no route)
  NetworkUnreachable,
  /// The request was sent but no response arrived in time
  Timeout,
  /// The remote answered with a 5xx status
  ServerError,
  /// The remote rejected the request with a 4xx status
  ClientError,
  /// The response body could not be decoded into the payload type
  DecodeError,
}

impl FailKind {
  /// Classify an HTTP status code. Returns `None` for non-error statuses.
  pub fn from_status(status: u16) -> Option<Self> {
    match status {
      400..=499 => Some(Self::ClientError),
      500..=599 => Some(Self::ServerError),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NetworkUnreachable => "network-unreachable",
      Self::Timeout => "timeout",
      Self::ServerError => "server-error",
      Self::ClientError => "client-error",
      Self::DecodeError => "decode-error",
    }
  }
}

impl fmt::Display for FailKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A classified fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
  pub kind: FailKind,
  pub message: String,
}

impl Failure {
  pub fn new(kind: FailKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome<R> {
  /// The payload was received and decoded
  Ok(R),
  /// The call succeeded but carried no payload
  Empty,
  /// The call failed
  Fail(Failure),
}

impl<R> RemoteOutcome<R> {
  pub fn fail(kind: FailKind, message: impl Into<String>) -> Self {
    RemoteOutcome::Fail(Failure::new(kind, message))
  }

  pub fn is_ok(&self) -> bool {
    matches!(self, RemoteOutcome::Ok(_))
  }

  pub fn map<U, F>(self, f: F) -> RemoteOutcome<U>
  where
    F: FnOnce(R) -> U,
  {
    match self {
      RemoteOutcome::Ok(payload) => RemoteOutcome::Ok(f(payload)),
      RemoteOutcome::Empty => RemoteOutcome::Empty,
      RemoteOutcome::Fail(failure) => RemoteOutcome::Fail(failure),
    }
  }

  /// Convert into a `Result`, treating `Empty` as `Ok(None)`.
  pub fn into_result(self) -> Result<Option<R>, Failure> {
    match self {
      RemoteOutcome::Ok(payload) => Ok(Some(payload)),
      RemoteOutcome::Empty => Ok(None),
      RemoteOutcome::Fail(failure) => Err(failure),
    }
  }
}
