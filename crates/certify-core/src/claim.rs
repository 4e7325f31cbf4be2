//! Claim candidates and claim versions.
//!
//! A candidate is a provisional value pulled out of evidence text. Its final
//! status is decided exactly once, when it is written, by [`final_status`].
//! Promoted candidates become [`ClaimVersion`]s, the only rows downstream
//! readers should treat as current truth.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Minimum confidence for an auto-promotable candidate to be promoted.
pub const PROMOTION_THRESHOLD: f64 = 0.7;

/// Placeholder value carried by candidates that found nothing.
pub const UNKNOWN_VALUE: &str = "UNKNOWN";

// ─── Statuses ────────────────────────────────────────────────────────────────

/// The extractor's own verdict on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusAuto {
  Promotable,
  ReviewRequired,
}

impl StatusAuto {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Promotable => "PROMOTABLE",
      Self::ReviewRequired => "REVIEW_REQUIRED",
    }
  }
}

impl FromStr for StatusAuto {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PROMOTABLE" => Ok(Self::Promotable),
      "REVIEW_REQUIRED" => Ok(Self::ReviewRequired),
      other => Err(Error::unknown("auto status", other)),
    }
  }
}

/// The stored outcome of the promotion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusFinal {
  Promoted,
  ReviewRequired,
}

impl StatusFinal {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Promoted => "PROMOTED",
      Self::ReviewRequired => "REVIEW_REQUIRED",
    }
  }
}

impl FromStr for StatusFinal {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PROMOTED" => Ok(Self::Promoted),
      "REVIEW_REQUIRED" => Ok(Self::ReviewRequired),
      other => Err(Error::unknown("final status", other)),
    }
  }
}

impl fmt::Display for StatusFinal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Promoted iff the extractor marked the candidate promotable and its
/// confidence reaches [`PROMOTION_THRESHOLD`].
pub fn final_status(auto: StatusAuto, confidence: f64) -> StatusFinal {
  if auto == StatusAuto::Promotable && confidence >= PROMOTION_THRESHOLD {
    StatusFinal::Promoted
  } else {
    StatusFinal::ReviewRequired
  }
}

// ─── Candidate ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimCandidate {
  pub candidate_id: Uuid,
  pub entity_id:    Uuid,
  pub segment_id:   Option<String>,
  pub field_key:    String,
  pub value_text:   String,
  pub value_num:    Option<f64>,
  pub units:        Option<String>,
  /// In `0.0..=1.0`.
  pub confidence:   f64,
  /// Back-reference to the evidence the value was read from.
  pub evidence_id:  Option<Uuid>,
  /// Byte offsets of the match in the evidence body.
  pub span_start:   Option<usize>,
  pub span_end:     Option<usize>,
  pub tier:         String,
  pub status_auto:  StatusAuto,
  pub auto_reason:  String,
  pub status_final: StatusFinal,
  pub created_at:   DateTime<Utc>,
}

impl ClaimCandidate {
  pub fn has_known_value(&self) -> bool { self.value_text != UNKNOWN_VALUE }
}

/// Input to [`crate::store::IntelStore::record_candidate`].
///
/// There is no `status_final` here: the store applies [`final_status`] at
/// write time.
#[derive(Debug, Clone)]
pub struct NewCandidate {
  pub entity_id:   Uuid,
  pub segment_id:  Option<String>,
  pub field_key:   String,
  pub value_text:  String,
  pub value_num:   Option<f64>,
  pub units:       Option<String>,
  pub confidence:  f64,
  pub evidence_id: Option<Uuid>,
  pub span_start:  Option<usize>,
  pub span_end:    Option<usize>,
  pub tier:        String,
  pub status_auto: StatusAuto,
  pub auto_reason: String,
}

impl NewCandidate {
  pub fn status_final(&self) -> StatusFinal { final_status(self.status_auto, self.confidence) }
}

// ─── Claim version ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
  Number,
  Text,
}

impl ValueType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Number => "number",
      Self::Text => "text",
    }
  }
}

impl FromStr for ValueType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "number" => Ok(Self::Number),
      "text" => Ok(Self::Text),
      other => Err(Error::unknown("value type", other)),
    }
  }
}

/// An immutable, promoted value of a field for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimVersion {
  pub version_id:     Uuid,
  /// Identifies the logical claim across versions.
  pub claim_id:       Uuid,
  pub entity_id:      Uuid,
  pub field_key:      String,
  pub value_type:     ValueType,
  pub value_num:      Option<f64>,
  pub value_text:     String,
  pub confidence:     f64,
  pub tier:           String,
  pub evidence_id:    Uuid,
  pub created_at_utc: DateTime<Utc>,
  pub created_by:     String,
  pub reason:         String,
  /// Always `"active"` for versions minted by the pipeline.
  pub status:         String,
}

impl ClaimVersion {
  /// True when `candidate` carries the same value as this version,
  /// regardless of which evidence it was read from.
  pub fn same_value_as(&self, candidate: &ClaimCandidate) -> bool {
    self.value_text == candidate.value_text && self.value_num == candidate.value_num
  }
}

/// Input to [`crate::store::IntelStore::record_claim_version`].
/// `version_id` and `created_at_utc` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewClaimVersion {
  /// Reuse an existing claim's id to chain versions; `None` mints a new one.
  pub claim_id:    Option<Uuid>,
  pub entity_id:   Uuid,
  pub field_key:   String,
  pub value_type:  ValueType,
  pub value_num:   Option<f64>,
  pub value_text:  String,
  pub confidence:  f64,
  pub tier:        String,
  pub evidence_id: Uuid,
  pub created_by:  String,
  pub reason:      String,
}

impl NewClaimVersion {
  /// Build a version from a promoted candidate. Returns `None` when the
  /// candidate has no evidence reference.
  pub fn from_candidate(
    candidate: &ClaimCandidate,
    created_by: &str,
    claim_id: Option<Uuid>,
  ) -> Option<Self> {
    let evidence_id = candidate.evidence_id?;
    let value_type = if candidate.value_num.is_some() {
      ValueType::Number
    } else {
      ValueType::Text
    };
    Some(Self {
      claim_id,
      entity_id: candidate.entity_id,
      field_key: candidate.field_key.clone(),
      value_type,
      value_num: candidate.value_num,
      value_text: candidate.value_text.clone(),
      confidence: candidate.confidence,
      tier: candidate.tier.clone(),
      evidence_id,
      created_by: created_by.to_owned(),
      reason: format!("promoted from candidate {}", candidate.candidate_id),
    })
  }
}
