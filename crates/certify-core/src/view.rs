//! Dependent read model rebuilt at the end of every pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityStatus;

/// Per-entity roll-up consumed by dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
  pub entity_id:           Uuid,
  pub canonical_name:      String,
  pub domain:              String,
  pub status:              EntityStatus,
  pub evidence_count:      u64,
  pub claim_version_count: u64,
  pub open_review_count:   u64,
  pub last_evidence_at:    Option<DateTime<Utc>>,
  pub refreshed_at:        DateTime<Utc>,
}
