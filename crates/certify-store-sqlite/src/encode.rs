//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings with fixed microsecond
//! precision, so lexical order matches chronological order. UUIDs are stored
//! as hyphenated lowercase strings. Enumerations use their domain codes.

use chrono::{DateTime, SecondsFormat, Utc};
use certify_core::{
  allowlist::SourceRule,
  claim::{ClaimCandidate, ClaimVersion},
  entity::Entity,
  event::{AlertRule, Event, EventStatus},
  evidence::{Evidence, Snapshot},
  review::{ReviewStatus, ReviewTask},
  run::{Run, RunStatus},
  view::EntitySummary,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Integers ────────────────────────────────────────────────────────────────

fn decode_usize(v: i64, column: &str) -> Result<usize> {
  usize::try_from(v).map_err(|_| Error::Decode(format!("{column}: {v} is not a valid size")))
}

fn decode_opt_usize(v: Option<i64>, column: &str) -> Result<Option<usize>> {
  v.map(|v| decode_usize(v, column)).transpose()
}

fn decode_u64(v: i64, column: &str) -> Result<u64> {
  u64::try_from(v).map_err(|_| Error::Decode(format!("{column}: {v} is negative")))
}

pub fn encode_usize(v: usize) -> i64 { i64::try_from(v).unwrap_or(i64::MAX) }

// ─── Column lists ────────────────────────────────────────────────────────────
//
// Each list matches the field order of the corresponding `Raw*::from_row`.

pub const SOURCE_COLS: &str = "source_key, enabled, domain, tier";

pub const ENTITY_COLS: &str = "entity_id, canonical_name, domain, vertical, region, segment_id, \
                               discovered_via, discovered_at, status";

pub const EVIDENCE_COLS: &str = "evidence_id, entity_id, source_key, tier, url, fetched_at, \
                                 snippet, text_hash, domain_calc, allowlist_ok";

pub const SNAPSHOT_COLS: &str = "snapshot_id, url, domain, source_key, entity_id, fetched_at_utc, \
                                 http_status, text_hash, text_len, notes";

pub const CANDIDATE_COLS: &str = "candidate_id, entity_id, segment_id, field_key, value_text, \
                                  value_num, units, confidence, evidence_id, span_start, span_end, \
                                  tier, status_auto, auto_reason, status_final, created_at";

pub const CLAIM_COLS: &str = "version_id, claim_id, entity_id, field_key, value_type, value_num, \
                              value_text, confidence, tier, evidence_id, created_at_utc, \
                              created_by, reason, status";

pub const ALERT_RULE_COLS: &str = "rule_key, name, enabled, last_fired_at_utc";

pub const SUMMARY_COLS: &str = "entity_id, canonical_name, domain, status, evidence_count, \
                                claim_version_count, open_review_count, last_evidence_at, \
                                refreshed_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `sources` row.
pub struct RawSource {
  pub source_key: String,
  pub enabled:    bool,
  pub domain:     Option<String>,
  pub tier:       String,
}

impl RawSource {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source_key: row.get(0)?,
      enabled:    row.get(1)?,
      domain:     row.get(2)?,
      tier:       row.get(3)?,
    })
  }

  pub fn into_source(self) -> SourceRule {
    SourceRule {
      source_key: self.source_key,
      enabled:    self.enabled,
      domain:     self.domain,
      tier:       self.tier,
    }
  }
}

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub entity_id:      String,
  pub canonical_name: String,
  pub domain:         String,
  pub vertical:       Option<String>,
  pub region:         Option<String>,
  pub segment_id:     Option<String>,
  pub discovered_via: String,
  pub discovered_at:  String,
  pub status:         String,
}

impl RawEntity {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:      row.get(0)?,
      canonical_name: row.get(1)?,
      domain:         row.get(2)?,
      vertical:       row.get(3)?,
      region:         row.get(4)?,
      segment_id:     row.get(5)?,
      discovered_via: row.get(6)?,
      discovered_at:  row.get(7)?,
      status:         row.get(8)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      entity_id:      decode_uuid(&self.entity_id)?,
      canonical_name: self.canonical_name,
      domain:         self.domain,
      vertical:       self.vertical,
      region:         self.region,
      segment_id:     self.segment_id,
      discovered_via: self.discovered_via,
      discovered_at:  decode_dt(&self.discovered_at)?,
      status:         self.status.parse()?,
    })
  }
}

pub struct RawEvidence {
  pub evidence_id:  String,
  pub entity_id:    String,
  pub source_key:   String,
  pub tier:         String,
  pub url:          String,
  pub fetched_at:   String,
  pub snippet:      String,
  pub text_hash:    String,
  pub domain_calc:  String,
  pub allowlist_ok: bool,
}

impl RawEvidence {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      evidence_id:  row.get(0)?,
      entity_id:    row.get(1)?,
      source_key:   row.get(2)?,
      tier:         row.get(3)?,
      url:          row.get(4)?,
      fetched_at:   row.get(5)?,
      snippet:      row.get(6)?,
      text_hash:    row.get(7)?,
      domain_calc:  row.get(8)?,
      allowlist_ok: row.get(9)?,
    })
  }

  pub fn into_evidence(self) -> Result<Evidence> {
    Ok(Evidence {
      evidence_id:  decode_uuid(&self.evidence_id)?,
      entity_id:    decode_uuid(&self.entity_id)?,
      source_key:   self.source_key,
      tier:         self.tier,
      url:          self.url,
      fetched_at:   decode_dt(&self.fetched_at)?,
      snippet:      self.snippet,
      text_hash:    self.text_hash,
      domain_calc:  self.domain_calc,
      allowlist_ok: self.allowlist_ok,
    })
  }
}

pub struct RawSnapshot {
  pub snapshot_id:    String,
  pub url:            String,
  pub domain:         String,
  pub source_key:     String,
  pub entity_id:      Option<String>,
  pub fetched_at_utc: String,
  pub http_status:    i64,
  pub text_hash:      String,
  pub text_len:       i64,
  pub notes:          Option<String>,
}

impl RawSnapshot {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:    row.get(0)?,
      url:            row.get(1)?,
      domain:         row.get(2)?,
      source_key:     row.get(3)?,
      entity_id:      row.get(4)?,
      fetched_at_utc: row.get(5)?,
      http_status:    row.get(6)?,
      text_hash:      row.get(7)?,
      text_len:       row.get(8)?,
      notes:          row.get(9)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    let http_status = u16::try_from(self.http_status)
      .map_err(|_| Error::Decode(format!("http_status: {}", self.http_status)))?;
    Ok(Snapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      url: self.url,
      domain: self.domain,
      source_key: self.source_key,
      entity_id: decode_opt_uuid(self.entity_id)?,
      fetched_at_utc: decode_dt(&self.fetched_at_utc)?,
      http_status,
      text_hash: self.text_hash,
      text_len: decode_usize(self.text_len, "text_len")?,
      notes: self.notes,
    })
  }
}

pub struct RawCandidate {
  pub candidate_id: String,
  pub entity_id:    String,
  pub segment_id:   Option<String>,
  pub field_key:    String,
  pub value_text:   String,
  pub value_num:    Option<f64>,
  pub units:        Option<String>,
  pub confidence:   f64,
  pub evidence_id:  Option<String>,
  pub span_start:   Option<i64>,
  pub span_end:     Option<i64>,
  pub tier:         String,
  pub status_auto:  String,
  pub auto_reason:  String,
  pub status_final: String,
  pub created_at:   String,
}

impl RawCandidate {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      candidate_id: row.get(0)?,
      entity_id:    row.get(1)?,
      segment_id:   row.get(2)?,
      field_key:    row.get(3)?,
      value_text:   row.get(4)?,
      value_num:    row.get(5)?,
      units:        row.get(6)?,
      confidence:   row.get(7)?,
      evidence_id:  row.get(8)?,
      span_start:   row.get(9)?,
      span_end:     row.get(10)?,
      tier:         row.get(11)?,
      status_auto:  row.get(12)?,
      auto_reason:  row.get(13)?,
      status_final: row.get(14)?,
      created_at:   row.get(15)?,
    })
  }

  pub fn into_candidate(self) -> Result<ClaimCandidate> {
    Ok(ClaimCandidate {
      candidate_id: decode_uuid(&self.candidate_id)?,
      entity_id:    decode_uuid(&self.entity_id)?,
      segment_id:   self.segment_id,
      field_key:    self.field_key,
      value_text:   self.value_text,
      value_num:    self.value_num,
      units:        self.units,
      confidence:   self.confidence,
      evidence_id:  decode_opt_uuid(self.evidence_id)?,
      span_start:   decode_opt_usize(self.span_start, "span_start")?,
      span_end:     decode_opt_usize(self.span_end, "span_end")?,
      tier:         self.tier,
      status_auto:  self.status_auto.parse()?,
      auto_reason:  self.auto_reason,
      status_final: self.status_final.parse()?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawClaimVersion {
  pub version_id:     String,
  pub claim_id:       String,
  pub entity_id:      String,
  pub field_key:      String,
  pub value_type:     String,
  pub value_num:      Option<f64>,
  pub value_text:     String,
  pub confidence:     f64,
  pub tier:           String,
  pub evidence_id:    String,
  pub created_at_utc: String,
  pub created_by:     String,
  pub reason:         String,
  pub status:         String,
}

impl RawClaimVersion {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:     row.get(0)?,
      claim_id:       row.get(1)?,
      entity_id:      row.get(2)?,
      field_key:      row.get(3)?,
      value_type:     row.get(4)?,
      value_num:      row.get(5)?,
      value_text:     row.get(6)?,
      confidence:     row.get(7)?,
      tier:           row.get(8)?,
      evidence_id:    row.get(9)?,
      created_at_utc: row.get(10)?,
      created_by:     row.get(11)?,
      reason:         row.get(12)?,
      status:         row.get(13)?,
    })
  }

  pub fn into_claim_version(self) -> Result<ClaimVersion> {
    Ok(ClaimVersion {
      version_id:     decode_uuid(&self.version_id)?,
      claim_id:       decode_uuid(&self.claim_id)?,
      entity_id:      decode_uuid(&self.entity_id)?,
      field_key:      self.field_key,
      value_type:     self.value_type.parse()?,
      value_num:      self.value_num,
      value_text:     self.value_text,
      confidence:     self.confidence,
      tier:           self.tier,
      evidence_id:    decode_uuid(&self.evidence_id)?,
      created_at_utc: decode_dt(&self.created_at_utc)?,
      created_by:     self.created_by,
      reason:         self.reason,
      status:         self.status,
    })
  }
}

/// Raw strings read from an `events` row joined with its acknowledgement.
pub struct RawEvent {
  // events columns
  pub event_id:        String,
  pub event_type:      String,
  pub severity:        String,
  pub url:             String,
  pub detected_at_utc: String,
  pub prev_text_hash:  String,
  pub new_text_hash:   String,
  pub summary:         String,
  // event_acknowledgements join
  pub ack_note:        Option<String>,
  pub ack_at:          Option<String>,
}

impl RawEvent {
  pub const SELECT: &'static str = "SELECT
       e.event_id, e.event_type, e.severity, e.url, e.detected_at_utc,
       e.prev_text_hash, e.new_text_hash, e.summary,
       a.note        AS ack_note,
       a.recorded_at AS ack_at
     FROM events e
     LEFT JOIN event_acknowledgements a ON a.event_id = e.event_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:        row.get(0)?,
      event_type:      row.get(1)?,
      severity:        row.get(2)?,
      url:             row.get(3)?,
      detected_at_utc: row.get(4)?,
      prev_text_hash:  row.get(5)?,
      new_text_hash:   row.get(6)?,
      summary:         row.get(7)?,
      ack_note:        row.get(8)?,
      ack_at:          row.get(9)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    let status = match self.ack_at {
      Some(at) => EventStatus::Closed { note: self.ack_note, at: decode_dt(&at)? },
      None => EventStatus::Open,
    };
    Ok(Event {
      event_id: decode_uuid(&self.event_id)?,
      event_type: self.event_type.parse()?,
      severity: self.severity.parse()?,
      url: self.url,
      detected_at_utc: decode_dt(&self.detected_at_utc)?,
      prev_text_hash: self.prev_text_hash,
      new_text_hash: self.new_text_hash,
      summary: self.summary,
      status,
    })
  }
}

pub struct RawAlertRule {
  pub rule_key:          String,
  pub name:              String,
  pub enabled:           bool,
  pub last_fired_at_utc: Option<String>,
}

impl RawAlertRule {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rule_key:          row.get(0)?,
      name:              row.get(1)?,
      enabled:           row.get(2)?,
      last_fired_at_utc: row.get(3)?,
    })
  }

  pub fn into_rule(self) -> Result<AlertRule> {
    Ok(AlertRule {
      rule_key:          self.rule_key,
      name:              self.name,
      enabled:           self.enabled,
      last_fired_at_utc: decode_opt_dt(self.last_fired_at_utc)?,
    })
  }
}

/// Raw strings read from a `review_tasks` row joined with its resolution.
pub struct RawReviewTask {
  pub task_id:         String,
  pub created_at:      String,
  pub entity_id:       Option<String>,
  pub field_key:       Option<String>,
  pub severity:        String,
  pub reason:          String,
  pub evidence_id:     Option<String>,
  pub url:             Option<String>,
  pub resolution_note: Option<String>,
  pub resolved_at:     Option<String>,
}

impl RawReviewTask {
  pub const SELECT: &'static str = "SELECT
       t.task_id, t.created_at, t.entity_id, t.field_key, t.severity,
       t.reason, t.evidence_id, t.url,
       r.note        AS resolution_note,
       r.recorded_at AS resolved_at
     FROM review_tasks t
     LEFT JOIN review_resolutions r ON r.task_id = t.task_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      task_id:         row.get(0)?,
      created_at:      row.get(1)?,
      entity_id:       row.get(2)?,
      field_key:       row.get(3)?,
      severity:        row.get(4)?,
      reason:          row.get(5)?,
      evidence_id:     row.get(6)?,
      url:             row.get(7)?,
      resolution_note: row.get(8)?,
      resolved_at:     row.get(9)?,
    })
  }

  pub fn into_task(self) -> Result<ReviewTask> {
    let status = match self.resolved_at {
      Some(at) => ReviewStatus::Resolved { note: self.resolution_note, at: decode_dt(&at)? },
      None => ReviewStatus::Open,
    };
    Ok(ReviewTask {
      task_id: decode_uuid(&self.task_id)?,
      created_at: decode_dt(&self.created_at)?,
      entity_id: decode_opt_uuid(self.entity_id)?,
      field_key: self.field_key,
      severity: self.severity.parse()?,
      reason: self.reason,
      evidence_id: decode_opt_uuid(self.evidence_id)?,
      url: self.url,
      status,
    })
  }
}

/// Raw strings read from a `runs` row joined with its outcome.
pub struct RawRun {
  pub run_id:          String,
  pub started_at_utc:  String,
  pub mode:            String,
  pub status:          Option<String>,
  pub notes:           Option<String>,
  pub finished_at_utc: Option<String>,
}

impl RawRun {
  pub const SELECT: &'static str = "SELECT
       r.run_id, r.started_at_utc, r.mode,
       o.status, o.notes, o.finished_at_utc
     FROM runs r
     LEFT JOIN run_outcomes o ON o.run_id = r.run_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:          row.get(0)?,
      started_at_utc:  row.get(1)?,
      mode:            row.get(2)?,
      status:          row.get(3)?,
      notes:           row.get(4)?,
      finished_at_utc: row.get(5)?,
    })
  }

  pub fn into_run(self) -> Result<Run> {
    let status = match self.status.as_deref() {
      Some(s) => s.parse()?,
      None => RunStatus::Running,
    };
    Ok(Run {
      run_id: decode_uuid(&self.run_id)?,
      started_at_utc: decode_dt(&self.started_at_utc)?,
      mode: self.mode.parse()?,
      status,
      notes: self.notes,
      finished_at_utc: decode_opt_dt(self.finished_at_utc)?,
    })
  }
}

pub struct RawSummary {
  pub entity_id:           String,
  pub canonical_name:      String,
  pub domain:              String,
  pub status:              String,
  pub evidence_count:      i64,
  pub claim_version_count: i64,
  pub open_review_count:   i64,
  pub last_evidence_at:    Option<String>,
  pub refreshed_at:        String,
}

impl RawSummary {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:           row.get(0)?,
      canonical_name:      row.get(1)?,
      domain:              row.get(2)?,
      status:              row.get(3)?,
      evidence_count:      row.get(4)?,
      claim_version_count: row.get(5)?,
      open_review_count:   row.get(6)?,
      last_evidence_at:    row.get(7)?,
      refreshed_at:        row.get(8)?,
    })
  }

  pub fn into_summary(self) -> Result<EntitySummary> {
    Ok(EntitySummary {
      entity_id:           decode_uuid(&self.entity_id)?,
      canonical_name:      self.canonical_name,
      domain:              self.domain,
      status:              self.status.parse()?,
      evidence_count:      decode_u64(self.evidence_count, "evidence_count")?,
      claim_version_count: decode_u64(self.claim_version_count, "claim_version_count")?,
      open_review_count:   decode_u64(self.open_review_count, "open_review_count")?,
      last_evidence_at:    decode_opt_dt(self.last_evidence_at)?,
      refreshed_at:        decode_dt(&self.refreshed_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
    let b = Utc.timestamp_opt(1_700_000_000, 120_000_000).unwrap();
    let c = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }
}
