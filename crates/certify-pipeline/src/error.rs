//! Error type for `certify-pipeline`.
//!
//! Only failures that make a run meaningless surface here. Everything a human
//! can act on (bad configuration, blocked domains, HTTP failures, low
//! confidence) goes to the review queue instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("run cancelled")]
  Cancelled,

  #[error("http client error: {0}")]
  HttpClient(#[from] reqwest::Error),

  #[error("invalid extraction pattern: {0}")]
  InvalidRegex(#[from] regex::Error),
}

impl Error {
  /// Box a backend error. Used as `.map_err(Error::store)` on every store
  /// call, since the backend's error type is generic.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
