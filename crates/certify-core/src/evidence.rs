//! Evidence and snapshots: the append-only record of what was fetched.
//!
//! An [`Evidence`] row ties a fetched document to an entity. A [`Snapshot`]
//! is a URL-scoped capture used only for change detection. Neither is ever
//! updated after it is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
  pub evidence_id:  Uuid,
  pub entity_id:    Uuid,
  pub source_key:   String,
  pub tier:         String,
  pub url:          String,
  pub fetched_at:   DateTime<Utc>,
  /// Leading excerpt of the fetched body.
  pub snippet:      String,
  /// SHA-256 hex digest of the full body.
  pub text_hash:    String,
  pub domain_calc:  String,
  pub allowlist_ok: bool,
}

/// Input to [`crate::store::IntelStore::record_evidence`].
/// `evidence_id` and `fetched_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEvidence {
  pub entity_id:    Uuid,
  pub source_key:   String,
  pub tier:         String,
  pub url:          String,
  pub snippet:      String,
  pub text_hash:    String,
  pub domain_calc:  String,
  pub allowlist_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id:    Uuid,
  pub url:            String,
  pub domain:         String,
  pub source_key:     String,
  pub entity_id:      Option<Uuid>,
  pub fetched_at_utc: DateTime<Utc>,
  pub http_status:    u16,
  pub text_hash:      String,
  pub text_len:       usize,
  pub notes:          Option<String>,
}

/// Input to [`crate::store::IntelStore::record_snapshot`].
#[derive(Debug, Clone)]
pub struct NewSnapshot {
  pub url:         String,
  pub domain:      String,
  pub source_key:  String,
  pub entity_id:   Option<Uuid>,
  pub http_status: u16,
  pub text_hash:   String,
  pub text_len:    usize,
  pub notes:       Option<String>,
}
