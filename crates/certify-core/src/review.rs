//! Review tasks: the human work queue every pipeline stage writes its
//! failures and low-confidence outcomes to.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{allowlist::AllowlistDecision, severity::Severity};

/// Machine-readable reason for a review task. [`fmt::Display`] renders the
/// stored code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewReason {
  UnknownProvider(String),
  MissingApiKey,
  /// The configured search endpoint is not an absolute URL.
  InvalidEndpoint,
  DiscoveryFailHttp(u16),
  JsonParseFailed,
  AllowlistFail(AllowlistDecision),
  FetchFailHttp(u16),
  /// Raised by an extractor; carries the extractor's own code.
  Extraction(String),
}

impl ReviewReason {
  /// The severity each reason is raised with.
  pub fn severity(&self) -> Severity {
    match self {
      Self::Extraction(_) => Severity::Medium,
      _ => Severity::High,
    }
  }
}

impl fmt::Display for ReviewReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnknownProvider(name) => write!(f, "UNKNOWN_PROVIDER:{name}"),
      Self::MissingApiKey => f.write_str("MISSING_API_KEY"),
      Self::InvalidEndpoint => f.write_str("INVALID_ENDPOINT"),
      Self::DiscoveryFailHttp(code) => write!(f, "DISCOVERY_FAIL_HTTP_{code}"),
      Self::JsonParseFailed => f.write_str("JSON_PARSE_FAILED"),
      Self::AllowlistFail(decision) => write!(f, "ALLOWLIST_FAIL:{decision}"),
      Self::FetchFailHttp(code) => write!(f, "FETCH_FAIL_HTTP_{code}"),
      Self::Extraction(code) => f.write_str(code),
    }
  }
}

/// Lifecycle status of a review task, computed at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewStatus {
  #[serde(rename = "OPEN")]
  Open,
  Resolved {
    note: Option<String>,
    at:   DateTime<Utc>,
  },
}

impl ReviewStatus {
  pub fn is_open(&self) -> bool { matches!(self, Self::Open) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTask {
  pub task_id:     Uuid,
  pub created_at:  DateTime<Utc>,
  pub entity_id:   Option<Uuid>,
  pub field_key:   Option<String>,
  pub severity:    Severity,
  pub reason:      String,
  pub evidence_id: Option<Uuid>,
  pub url:         Option<String>,
  pub status:      ReviewStatus,
}

/// Input to [`crate::store::IntelStore::record_review_task`].
#[derive(Debug, Clone)]
pub struct NewReviewTask {
  pub entity_id:   Option<Uuid>,
  pub field_key:   Option<String>,
  pub severity:    Severity,
  pub reason:      String,
  pub evidence_id: Option<Uuid>,
  pub url:         Option<String>,
}

impl NewReviewTask {
  /// A task with the reason's default severity and no references.
  pub fn new(reason: &ReviewReason) -> Self {
    Self {
      entity_id:   None,
      field_key:   None,
      severity:    reason.severity(),
      reason:      reason.to_string(),
      evidence_id: None,
      url:         None,
    }
  }

  pub fn entity(mut self, entity_id: Uuid) -> Self {
    self.entity_id = Some(entity_id);
    self
  }

  pub fn field(mut self, field_key: impl Into<String>) -> Self {
    self.field_key = Some(field_key.into());
    self
  }

  pub fn evidence(mut self, evidence_id: Uuid) -> Self {
    self.evidence_id = Some(evidence_id);
    self
  }

  pub fn url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }
}

/// Records that an analyst closed a review task.
/// A task can be resolved at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
  pub resolution_id: Uuid,
  pub task_id:       Uuid,
  pub note:          Option<String>,
  pub recorded_at:   DateTime<Utc>,
}
