//! Run log: one row per orchestrator invocation.
//!
//! The run row is written when a run starts. Its outcome is a separate
//! append-only record; a run with no outcome is still [`RunStatus::Running`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
  /// Every stage, starting with discovery.
  #[default]
  Full,
  /// Every stage except discovery; re-checks known entities only.
  Refresh,
}

impl RunMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Full => "full",
      Self::Refresh => "refresh",
    }
  }

  pub fn runs_discovery(self) -> bool { matches!(self, Self::Full) }
}

impl fmt::Display for RunMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RunMode {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "full" => Ok(Self::Full),
      "refresh" => Ok(Self::Refresh),
      other => Err(Error::unknown("run mode", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Running,
  Completed,
  Failed,
}

impl RunStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
    }
  }

  pub fn is_terminal(self) -> bool { !matches!(self, Self::Running) }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RunStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "running" => Ok(Self::Running),
      "completed" => Ok(Self::Completed),
      "failed" => Ok(Self::Failed),
      other => Err(Error::unknown("run status", other)),
    }
  }
}

/// A run with its outcome resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
  pub run_id:          Uuid,
  pub started_at_utc:  DateTime<Utc>,
  pub mode:            RunMode,
  pub status:          RunStatus,
  pub notes:           Option<String>,
  pub finished_at_utc: Option<DateTime<Utc>>,
}

/// Input to [`crate::store::IntelStore::finish_run`]. `status` must be
/// terminal.
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub status: RunStatus,
  pub notes:  Option<String>,
}

impl RunOutcome {
  pub fn completed(notes: impl Into<String>) -> Self {
    Self { status: RunStatus::Completed, notes: Some(notes.into()) }
  }

  pub fn failed(notes: impl Into<String>) -> Self {
    Self { status: RunStatus::Failed, notes: Some(notes.into()) }
  }
}
