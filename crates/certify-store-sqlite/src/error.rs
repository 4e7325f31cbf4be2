//! Error type for `certify-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] certify_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored integer did not fit the domain type.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("event not found: {0}")]
  EventNotFound(Uuid),

  #[error("event {0} is already acknowledged")]
  AlreadyAcknowledged(Uuid),

  #[error("review task not found: {0}")]
  ReviewTaskNotFound(Uuid),

  #[error("review task {0} is already resolved")]
  AlreadyResolved(Uuid),

  #[error("run not found: {0}")]
  RunNotFound(Uuid),

  #[error("run {0} is already finished")]
  RunAlreadyFinished(Uuid),

  #[error("a run outcome must be completed or failed")]
  NonTerminalOutcome,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
