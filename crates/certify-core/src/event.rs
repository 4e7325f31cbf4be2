//! Change events and alert rules.
//!
//! Events are append-only. Acknowledging one records a separate
//! [`Acknowledgement`]; an event's [`EventStatus`] is computed at query time
//! by joining against those records.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, severity::Severity};

/// The only rule key the alert evaluator recognises.
pub const EVIDENCE_CHANGED_ANY: &str = "EVIDENCE_CHANGED_ANY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
  EvidenceChanged,
}

impl EventType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::EvidenceChanged => "EVIDENCE_CHANGED",
    }
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for EventType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "EVIDENCE_CHANGED" => Ok(Self::EvidenceChanged),
      other => Err(Error::unknown("event type", other)),
    }
  }
}

/// Lifecycle status of an event, computed at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventStatus {
  #[serde(rename = "OPEN")]
  Open,
  Closed {
    note: Option<String>,
    at:   DateTime<Utc>,
  },
}

impl EventStatus {
  pub fn is_open(&self) -> bool { matches!(self, Self::Open) }
}

/// A detected content change between two snapshots of the same URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub event_id:        Uuid,
  pub event_type:      EventType,
  pub severity:        Severity,
  pub url:             String,
  pub detected_at_utc: DateTime<Utc>,
  pub prev_text_hash:  String,
  pub new_text_hash:   String,
  pub summary:         String,
  pub status:          EventStatus,
}

/// Input to [`crate::store::IntelStore::record_event`].
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub event_type:     EventType,
  pub severity:       Severity,
  pub url:            String,
  pub prev_text_hash: String,
  pub new_text_hash:  String,
  pub summary:        String,
}

/// Records that an analyst has dealt with an event.
/// An event can be acknowledged at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgement {
  pub acknowledgement_id: Uuid,
  pub event_id:           Uuid,
  pub note:               Option<String>,
  pub recorded_at:        DateTime<Utc>,
}

// ─── Alert rules ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
  pub rule_key:          String,
  pub name:              String,
  pub enabled:           bool,
  /// Stamped by the alert evaluator each time the rule's condition holds.
  #[serde(default)]
  pub last_fired_at_utc: Option<DateTime<Utc>>,
}

impl AlertRule {
  pub fn new(rule_key: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      rule_key:          rule_key.into(),
      name:              name.into(),
      enabled:           true,
      last_fired_at_utc: None,
    }
  }
}
