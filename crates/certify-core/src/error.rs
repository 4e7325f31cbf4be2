//! Error types for `certify-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A stored or user-supplied code did not match any known variant.
  #[error("unknown {kind} code: {code:?}")]
  UnknownCode { kind: &'static str, code: String },
}

impl Error {
  pub(crate) fn unknown(kind: &'static str, code: &str) -> Self {
    Self::UnknownCode { kind, code: code.to_owned() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
