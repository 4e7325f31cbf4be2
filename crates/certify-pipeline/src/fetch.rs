//! HTTP fetch layer.
//!
//! [`Fetcher`] is the seam between the pipeline and the network. It never
//! fails: transport errors come back as status `0` with an empty body, and
//! the calling stage turns that into a review task.

use std::{future::Future, time::Duration};

use reqwest::Client;

use crate::Result;

#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub url:     String,
  pub headers: Vec<(String, String)>,
  pub timeout: Duration,
}

impl FetchRequest {
  pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
    Self { url: url.into(), headers: Vec::new(), timeout }
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
  /// HTTP status, or `0` when no response was received.
  pub status: u16,
  pub body:   String,
}

impl FetchResponse {
  pub fn transport_failure() -> Self { Self { status: 0, body: String::new() } }

  pub fn is_ok(&self) -> bool { self.status == 200 }
}

pub trait Fetcher: Send + Sync {
  fn get(&self, request: FetchRequest) -> impl Future<Output = FetchResponse> + Send + '_;
}

// ─── reqwest ─────────────────────────────────────────────────────────────────

/// [`Fetcher`] backed by a shared [`reqwest::Client`]. No retries.
///
/// Cheap to clone; the inner client is `Arc`-based.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
}

impl HttpFetcher {
  /// `connect_timeout` bounds connection setup; each request's own timeout
  /// bounds the whole exchange.
  pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .user_agent(user_agent)
      .connect_timeout(connect_timeout)
      .build()?;
    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn get(&self, request: FetchRequest) -> FetchResponse {
    let mut builder = self.client.get(&request.url).timeout(request.timeout);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let resp = match builder.send().await {
      Ok(resp) => resp,
      Err(e) => {
        tracing::debug!(url = %request.url, error = %e, "request failed");
        return FetchResponse::transport_failure();
      }
    };

    let status = resp.status().as_u16();
    match resp.text().await {
      Ok(body) => FetchResponse { status, body },
      Err(e) => {
        tracing::debug!(url = %request.url, status, error = %e, "reading body failed");
        FetchResponse::transport_failure()
      }
    }
  }
}
