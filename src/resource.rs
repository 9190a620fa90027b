//! Resource state envelope emitted by every network-bound resource.
//!
//! A subscriber receives a sequence of `Resource<T>` values describing the
//! progress of one reconciliation between the local cache and the remote:
//!
//! ```ignore
//! while let Some(state) = stream.next().await {
//!     match state {
//!         Resource::Loading(cached) => render_spinner(cached.as_ref()),
//!         Resource::Success(data) => render_data(&data),
//!         Resource::Error { message, data } => render_error(&message, data.as_ref()),
//!     }
//! }
//! ```

/// The state of a resource at one point in its sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource<T> {
  /// A remote refresh is in progress. Carries the cached data, if any.
  Loading(Option<T>),
  /// Data that is safe to display as current.
  Success(T),
  /// The refresh failed. Carries the last known cached data, if any.
  Error { message: String, data: Option<T> },
}

/// Field-less discriminant of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Loading,
  Success,
  Error,
}

impl<T> Resource<T> {
  pub fn loading(data: Option<T>) -> Self {
    Resource::Loading(data)
  }

  pub fn success(data: T) -> Self {
    Resource::Success(data)
  }

  pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
    Resource::Error {
      message: message.into(),
      data,
    }
  }

  pub fn status(&self) -> Status {
    match self {
      Resource::Loading(_) => Status::Loading,
      Resource::Success(_) => Status::Success,
      Resource::Error { .. } => Status::Error,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, Resource::Loading(_))
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Resource::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Resource::Error { .. })
  }

  /// Attached data regardless of state.
  pub fn data(&self) -> Option<&T> {
    match self {
      Resource::Loading(data) | Resource::Error { data, .. } => data.as_ref(),
      Resource::Success(data) => Some(data),
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      Resource::Loading(data) | Resource::Error { data, .. } => data,
      Resource::Success(data) => Some(data),
    }
  }

  /// Error message if the resource failed.
  pub fn error_message(&self) -> Option<&str> {
    match self {
      Resource::Error { message, .. } => Some(message),
      _ => None,
    }
  }

  /// Transform the payload while keeping the state.
  pub fn map<U, F>(self, f: F) -> Resource<U>
  where
    F: FnOnce(T) -> U,
  {
    match self {
      Resource::Loading(data) => Resource::Loading(data.map(f)),
      Resource::Success(data) => Resource::Success(f(data)),
      Resource::Error { message, data } => Resource::Error {
        message,
        data: data.map(f),
      },
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Display for Resource<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Resource::Loading(None) => write!(f, "loading"),
      Resource::Loading(Some(data)) => write!(f, "loading (cached: {:?})", data),
      Resource::Success(data) => write!(f, "success: {:?}", data),
      Resource::Error {
        message,
        data: None,
      } => write!(f, "error: {}", message),
      Resource::Error {
        message,
        data: Some(data),
      } => write!(f, "error: {} (cached: {:?})", message, data),
    }
  }
}
