//! Mock claims API for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response, StatusCode};
use axum::routing::any;
use axum::Router;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// A captured request for assertions.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
  pub method: String,
  pub path: String,
  pub query: Option<String>,
  pub authorization: Option<String>,
  pub body: Vec<u8>,
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
  pub status: u16,
  pub body: String,
}

impl MockResponse {
  pub fn json(body: &str) -> Self {
    Self {
      status: 200,
      body: body.to_string(),
    }
  }

  pub fn error(status: u16, message: &str) -> Self {
    Self {
      status,
      body: format!(r#"{{"message": "{}"}}"#, message),
    }
  }
}

#[derive(Clone)]
struct MockState {
  requests: Arc<Mutex<Vec<CapturedRequest>>>,
  responses: Arc<Mutex<VecDeque<MockResponse>>>,
}

/// Mock API server answering queued responses in order.
pub struct MockApi {
  pub addr: SocketAddr,
  state: MockState,
  shutdown: tokio::sync::watch::Sender<bool>,
}

impl MockApi {
  pub async fn start() -> Self {
    let state = MockState {
      requests: Arc::new(Mutex::new(Vec::new())),
      responses: Arc::new(Mutex::new(VecDeque::new())),
    };

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let app = Router::new()
      .route("/{*path}", any(handle_request))
      .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
      .await
      .expect("Failed to bind mock server");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      axum::serve(listener, app)
        .with_graceful_shutdown(async move {
          let _ = shutdown_rx.changed().await;
        })
        .await
        .ok();
    });

    Self {
      addr,
      state,
      shutdown: shutdown_tx,
    }
  }

  pub async fn enqueue(&self, response: MockResponse) {
    self.state.responses.lock().await.push_back(response);
  }

  pub async fn requests(&self) -> Vec<CapturedRequest> {
    self.state.requests.lock().await.clone()
  }

  pub fn base_url(&self) -> String {
    format!("http://{}/api", self.addr)
  }
}

impl Drop for MockApi {
  fn drop(&mut self) {
    let _ = self.shutdown.send(true);
  }
}

async fn handle_request(State(state): State<MockState>, req: Request<Body>) -> Response<Body> {
  let method = req.method().to_string();
  let path = req.uri().path().to_string();
  let query = req.uri().query().map(String::from);
  let authorization = req
    .headers()
    .get("authorization")
    .and_then(|v| v.to_str().ok())
    .map(String::from);

  let body = axum::body::to_bytes(req.into_body(), 1024 * 1024)
    .await
    .unwrap_or_default()
    .to_vec();

  state.requests.lock().await.push(CapturedRequest {
    method,
    path,
    query,
    authorization,
    body,
  });

  let response = state
    .responses
    .lock()
    .await
    .pop_front()
    .unwrap_or_else(|| MockResponse::error(404, "no response queued"));

  Response::builder()
    .status(StatusCode::from_u16(response.status).unwrap())
    .header("content-type", "application/json")
    .body(Body::from(response.body))
    .unwrap()
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
  listener.local_addr().unwrap().port()
}
