//! HTTP transport helpers that turn a `reqwest` call into a [`RemoteOutcome`].

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::{FailKind, Failure, RemoteOutcome};

/// Send a request and decode a JSON payload, classifying any failure.
pub async fn send_json<R: DeserializeOwned>(request: RequestBuilder) -> RemoteOutcome<R> {
  let response = match request.send().await {
    Ok(response) => response,
    Err(e) => return transport_failure(&e),
  };

  let status = response.status().as_u16();
  let url = response.url().to_string();

  let body = match response.bytes().await {
    Ok(body) => body,
    Err(e) => return transport_failure(&e),
  };

  debug!(status, url = %url, bytes = body.len(), "remote response");
  decode_response(status, &body)
}

/// Decode a response body for the given status code.
///
/// 204 and blank bodies are `Empty`; 4xx/5xx become `Fail` with the message
/// the server supplied when it sent one.
pub fn decode_response<R: DeserializeOwned>(status: u16, body: &[u8]) -> RemoteOutcome<R> {
  if let Some(kind) = FailKind::from_status(status) {
    let message = error_message(status, body);
    warn!(status, kind = %kind, "remote rejected request: {}", message);
    return RemoteOutcome::Fail(Failure::new(kind, message));
  }

  if status == 204 || body.iter().all(u8::is_ascii_whitespace) {
    return RemoteOutcome::Empty;
  }

  match serde_json::from_slice(body) {
    Ok(payload) => RemoteOutcome::Ok(payload),
    Err(e) => {
      warn!(status, "failed to decode response body: {}", e);
      RemoteOutcome::fail(FailKind::DecodeError, format!("Failed to decode response: {}", e))
    }
  }
}

/// Classify an error raised before a status code was available.
fn transport_failure<R>(e: &reqwest::Error) -> RemoteOutcome<R> {
  let kind = if e.is_timeout() {
    FailKind::Timeout
  } else if e.is_decode() {
    FailKind::DecodeError
  } else {
    FailKind::NetworkUnreachable
  };

  warn!(kind = %kind, "remote request failed: {}", e);
  RemoteOutcome::fail(kind, e.to_string())
}

/// Pull a human-readable message out of an error body.
fn error_message(status: u16, body: &[u8]) -> String {
  let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
    ["message", "error", "detail"]
      .iter()
      .find_map(|field| v.get(field).and_then(Value::as_str).map(String::from))
  });

  match from_json {
    Some(message) => message,
    None => {
      let text = String::from_utf8_lossy(body);
      let text = text.trim();
      if text.is_empty() {
        format!("HTTP {}", status)
      } else {
        format!("HTTP {}: {}", status, text)
      }
    }
  }
}
