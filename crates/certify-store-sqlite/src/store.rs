//! [`SqliteStore`]: the SQLite implementation of [`IntelStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use certify_core::{
  allowlist::SourceRule,
  claim::{ClaimCandidate, ClaimVersion, NewCandidate, NewClaimVersion},
  entity::{Entity, EntityStatus, NewEntity, UpsertOutcome},
  event::{Acknowledgement, AlertRule, Event, EventType, NewEvent},
  evidence::{Evidence, NewEvidence, NewSnapshot, Snapshot},
  review::{NewReviewTask, Resolution, ReviewTask},
  run::{Run, RunMode, RunOutcome, RunStatus},
  store::IntelStore,
  view::EntitySummary,
};

use crate::{
  encode::{
    ALERT_RULE_COLS, CANDIDATE_COLS, CLAIM_COLS, ENTITY_COLS, EVIDENCE_COLS, RawAlertRule,
    RawCandidate, RawClaimVersion, RawEntity, RawEvent, RawEvidence, RawReviewTask, RawRun,
    RawSnapshot, RawSource, RawSummary, SNAPSHOT_COLS, SOURCE_COLS, SUMMARY_COLS, encode_dt,
    encode_usize, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Certify Intel store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Result of checking a row against its at-most-once lifecycle table.
enum Lifecycle {
  Missing,
  Closed,
  Open,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Close `id` at most once. In one transaction, check that `id` exists in
  /// its parent table and that no lifecycle record closes it yet, and only
  /// then run `insert`. Both queries take `id` as `?1`. Returns the state
  /// found before the insert; `insert` ran iff it is [`Lifecycle::Open`].
  async fn close_once<F>(
    &self,
    exists_sql: &'static str,
    closed_sql: &'static str,
    id: Uuid,
    insert: F,
  ) -> Result<Lifecycle>
  where
    F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<()> + Send + 'static,
  {
    let id_str = encode_uuid(id);

    let state = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let exists = tx
          .query_row(exists_sql, rusqlite::params![id_str], |_| Ok(()))
          .optional()?
          .is_some();
        if !exists {
          return Ok(Lifecycle::Missing);
        }
        let closed = tx
          .query_row(closed_sql, rusqlite::params![id_str], |_| Ok(()))
          .optional()?
          .is_some();
        if closed {
          return Ok(Lifecycle::Closed);
        }
        insert(&tx)?;
        tx.commit()?;
        Ok(Lifecycle::Open)
      })
      .await?;

    Ok(state)
  }

  async fn entity_by_domain(&self, domain: String) -> Result<Option<Entity>> {
    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ENTITY_COLS} FROM entities WHERE domain = ?1"),
              rusqlite::params![domain],
              RawEntity::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }
}

// ─── IntelStore impl ─────────────────────────────────────────────────────────

impl IntelStore for SqliteStore {
  type Error = Error;

  // ── Allowlist ─────────────────────────────────────────────────────────────

  async fn upsert_source(&self, rule: SourceRule) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sources (source_key, enabled, domain, tier) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(source_key) DO UPDATE SET
             enabled = excluded.enabled,
             domain  = excluded.domain,
             tier    = excluded.tier",
          rusqlite::params![rule.source_key, rule.enabled, rule.domain, rule.tier],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_source(&self, source_key: &str) -> Result<Option<SourceRule>> {
    let key = source_key.to_owned();

    let raw: Option<RawSource> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SOURCE_COLS} FROM sources WHERE source_key = ?1"),
              rusqlite::params![key],
              RawSource::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(RawSource::into_source))
  }

  async fn list_sources(&self) -> Result<Vec<SourceRule>> {
    let raws: Vec<RawSource> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {SOURCE_COLS} FROM sources ORDER BY source_key"))?;
        let rows = stmt
          .query_map([], RawSource::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawSource::into_source).collect())
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn upsert_entity(&self, input: NewEntity) -> Result<(Entity, UpsertOutcome)> {
    let domain = input.domain.clone();
    let new_id_str = encode_uuid(Uuid::new_v4());
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let renamed = tx.execute(
          "UPDATE entities SET canonical_name = ?2 WHERE domain = ?1",
          rusqlite::params![input.domain, input.canonical_name],
        )?;
        let outcome = if renamed > 0 {
          UpsertOutcome::Renamed
        } else {
          tx.execute(
            "INSERT INTO entities (
               entity_id, canonical_name, domain, vertical, region, segment_id,
               discovered_via, discovered_at, status
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
              new_id_str,
              input.canonical_name,
              input.domain,
              input.vertical,
              input.region,
              input.segment_id,
              input.discovered_via,
              now_str,
              EntityStatus::Active.as_str(),
            ],
          )?;
          UpsertOutcome::Created
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    let entity = self
      .entity_by_domain(domain.clone())
      .await?
      .ok_or_else(|| Error::Decode(format!("entity for {domain:?} vanished after upsert")))?;

    Ok((entity, outcome))
  }

  async fn get_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ENTITY_COLS} FROM entities WHERE entity_id = ?1"),
              rusqlite::params![id_str],
              RawEntity::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list_entities(&self) -> Result<Vec<Entity>> {
    let raws: Vec<RawEntity> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {ENTITY_COLS} FROM entities ORDER BY seq"))?;
        let rows = stmt
          .query_map([], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn set_entity_status(&self, entity_id: Uuid, status: EntityStatus) -> Result<Entity> {
    let id_str = encode_uuid(entity_id);
    let status_str = status.as_str();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities SET status = ?2 WHERE entity_id = ?1",
          rusqlite::params![id_str, status_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::EntityNotFound(entity_id));
    }
    self.get_entity(entity_id).await?.ok_or(Error::EntityNotFound(entity_id))
  }

  // ── Evidence & snapshots ──────────────────────────────────────────────────

  async fn record_evidence(&self, input: NewEvidence) -> Result<Evidence> {
    let evidence = Evidence {
      evidence_id:  Uuid::new_v4(),
      entity_id:    input.entity_id,
      source_key:   input.source_key,
      tier:         input.tier,
      url:          input.url,
      fetched_at:   Utc::now(),
      snippet:      input.snippet,
      text_hash:    input.text_hash,
      domain_calc:  input.domain_calc,
      allowlist_ok: input.allowlist_ok,
    };

    let row = evidence.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO evidence ({EVIDENCE_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
          ),
          rusqlite::params![
            encode_uuid(row.evidence_id),
            encode_uuid(row.entity_id),
            row.source_key,
            row.tier,
            row.url,
            encode_dt(row.fetched_at),
            row.snippet,
            row.text_hash,
            row.domain_calc,
            row.allowlist_ok,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(evidence)
  }

  async fn list_evidence(&self, entity_id: Option<Uuid>) -> Result<Vec<Evidence>> {
    let id_str = entity_id.map(encode_uuid);

    let raws: Vec<RawEvidence> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVIDENCE_COLS} FROM evidence
           WHERE ?1 IS NULL OR entity_id = ?1
           ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawEvidence::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvidence::into_evidence).collect()
  }

  async fn record_snapshot(&self, input: NewSnapshot) -> Result<Snapshot> {
    let snapshot = Snapshot {
      snapshot_id:    Uuid::new_v4(),
      url:            input.url,
      domain:         input.domain,
      source_key:     input.source_key,
      entity_id:      input.entity_id,
      fetched_at_utc: Utc::now(),
      http_status:    input.http_status,
      text_hash:      input.text_hash,
      text_len:       input.text_len,
      notes:          input.notes,
    };

    let row = snapshot.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO snapshots ({SNAPSHOT_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
          ),
          rusqlite::params![
            encode_uuid(row.snapshot_id),
            row.url,
            row.domain,
            row.source_key,
            row.entity_id.map(encode_uuid),
            encode_dt(row.fetched_at_utc),
            row.http_status,
            row.text_hash,
            encode_usize(row.text_len),
            row.notes,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(snapshot)
  }

  async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
    let raws: Vec<RawSnapshot> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {SNAPSHOT_COLS} FROM snapshots ORDER BY seq"))?;
        let rows = stmt
          .query_map([], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  // ── Candidates & claims ───────────────────────────────────────────────────

  async fn record_candidate(&self, input: NewCandidate) -> Result<ClaimCandidate> {
    let status_final = input.status_final();
    let candidate = ClaimCandidate {
      candidate_id: Uuid::new_v4(),
      entity_id: input.entity_id,
      segment_id: input.segment_id,
      field_key: input.field_key,
      value_text: input.value_text,
      value_num: input.value_num,
      units: input.units,
      confidence: input.confidence,
      evidence_id: input.evidence_id,
      span_start: input.span_start,
      span_end: input.span_end,
      tier: input.tier,
      status_auto: input.status_auto,
      auto_reason: input.auto_reason,
      status_final,
      created_at: Utc::now(),
    };

    let row = candidate.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO candidates ({CANDIDATE_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
          ),
          rusqlite::params![
            encode_uuid(row.candidate_id),
            encode_uuid(row.entity_id),
            row.segment_id,
            row.field_key,
            row.value_text,
            row.value_num,
            row.units,
            row.confidence,
            row.evidence_id.map(encode_uuid),
            row.span_start.map(encode_usize),
            row.span_end.map(encode_usize),
            row.tier,
            row.status_auto.as_str(),
            row.auto_reason,
            row.status_final.as_str(),
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(candidate)
  }

  async fn list_candidates(&self) -> Result<Vec<ClaimCandidate>> {
    let raws: Vec<RawCandidate> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {CANDIDATE_COLS} FROM candidates ORDER BY seq"))?;
        let rows = stmt
          .query_map([], RawCandidate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCandidate::into_candidate).collect()
  }

  async fn record_claim_version(&self, input: NewClaimVersion) -> Result<ClaimVersion> {
    let version = ClaimVersion {
      version_id:     Uuid::new_v4(),
      claim_id:       input.claim_id.unwrap_or_else(Uuid::new_v4),
      entity_id:      input.entity_id,
      field_key:      input.field_key,
      value_type:     input.value_type,
      value_num:      input.value_num,
      value_text:     input.value_text,
      confidence:     input.confidence,
      tier:           input.tier,
      evidence_id:    input.evidence_id,
      created_at_utc: Utc::now(),
      created_by:     input.created_by,
      reason:         input.reason,
      status:         "active".to_owned(),
    };

    let row = version.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO claim_versions ({CLAIM_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
          ),
          rusqlite::params![
            encode_uuid(row.version_id),
            encode_uuid(row.claim_id),
            encode_uuid(row.entity_id),
            row.field_key,
            row.value_type.as_str(),
            row.value_num,
            row.value_text,
            row.confidence,
            row.tier,
            encode_uuid(row.evidence_id),
            encode_dt(row.created_at_utc),
            row.created_by,
            row.reason,
            row.status,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(version)
  }

  async fn list_claim_versions(&self, entity_id: Option<Uuid>) -> Result<Vec<ClaimVersion>> {
    let id_str = entity_id.map(encode_uuid);

    let raws: Vec<RawClaimVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CLAIM_COLS} FROM claim_versions
           WHERE ?1 IS NULL OR entity_id = ?1
           ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawClaimVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClaimVersion::into_claim_version).collect()
  }

  async fn latest_claim_version(
    &self,
    entity_id: Uuid,
    field_key: &str,
  ) -> Result<Option<ClaimVersion>> {
    let id_str = encode_uuid(entity_id);
    let key = field_key.to_owned();

    let raw: Option<RawClaimVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CLAIM_COLS} FROM claim_versions
                 WHERE entity_id = ?1 AND field_key = ?2
                 ORDER BY seq DESC LIMIT 1"
              ),
              rusqlite::params![id_str, key],
              RawClaimVersion::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawClaimVersion::into_claim_version).transpose()
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn record_event(&self, input: NewEvent) -> Result<Event> {
    let event = Event {
      event_id:        Uuid::new_v4(),
      event_type:      input.event_type,
      severity:        input.severity,
      url:             input.url,
      detected_at_utc: Utc::now(),
      prev_text_hash:  input.prev_text_hash,
      new_text_hash:   input.new_text_hash,
      summary:         input.summary,
      status:          certify_core::event::EventStatus::Open,
    };

    let row = event.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (
             event_id, event_type, severity, url, detected_at_utc,
             prev_text_hash, new_text_hash, summary
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            encode_uuid(row.event_id),
            row.event_type.as_str(),
            row.severity.as_str(),
            row.url,
            encode_dt(row.detected_at_utc),
            row.prev_text_hash,
            row.new_text_hash,
            row.summary,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn list_events(&self, open_only: bool) -> Result<Vec<Event>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let filter = if open_only { "WHERE a.event_id IS NULL" } else { "" };
        let mut stmt = conn.prepare(&format!("{} {filter} ORDER BY e.seq", RawEvent::SELECT))?;
        let rows = stmt
          .query_map([], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn acknowledge_event(&self, event_id: Uuid, note: Option<String>) -> Result<Acknowledgement> {
    let ack = Acknowledgement {
      acknowledgement_id: Uuid::new_v4(),
      event_id,
      note,
      recorded_at: Utc::now(),
    };

    let row = ack.clone();
    let state = self
      .close_once(
        "SELECT 1 FROM events WHERE event_id = ?1",
        "SELECT 1 FROM event_acknowledgements WHERE event_id = ?1",
        event_id,
        move |conn| {
          conn.execute(
            "INSERT INTO event_acknowledgements (acknowledgement_id, event_id, note, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
              encode_uuid(row.acknowledgement_id),
              encode_uuid(row.event_id),
              row.note,
              encode_dt(row.recorded_at),
            ],
          )?;
          Ok(())
        },
      )
      .await?;

    match state {
      Lifecycle::Missing => Err(Error::EventNotFound(event_id)),
      Lifecycle::Closed => Err(Error::AlreadyAcknowledged(event_id)),
      Lifecycle::Open => Ok(ack),
    }
  }

  async fn count_open_events(&self, event_type: EventType) -> Result<u64> {
    let type_str = event_type.as_str();

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*)
           FROM events e
           LEFT JOIN event_acknowledgements a ON a.event_id = e.event_id
           WHERE e.event_type = ?1 AND a.event_id IS NULL",
          rusqlite::params![type_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }

  // ── Alert rules ───────────────────────────────────────────────────────────

  async fn upsert_alert_rule(&self, rule: AlertRule) -> Result<()> {
    let fired_str = rule.last_fired_at_utc.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO alert_rules ({ALERT_RULE_COLS}) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(rule_key) DO UPDATE SET
               name    = excluded.name,
               enabled = excluded.enabled"
          ),
          rusqlite::params![rule.rule_key, rule.name, rule.enabled, fired_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_alert_rules(&self) -> Result<Vec<AlertRule>> {
    let raws: Vec<RawAlertRule> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {ALERT_RULE_COLS} FROM alert_rules ORDER BY rule_key"))?;
        let rows = stmt
          .query_map([], RawAlertRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlertRule::into_rule).collect()
  }

  async fn mark_rule_fired(&self, rule_key: &str, at: DateTime<Utc>) -> Result<()> {
    let key = rule_key.to_owned();
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE alert_rules SET last_fired_at_utc = ?2 WHERE rule_key = ?1",
          rusqlite::params![key, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Review queue ──────────────────────────────────────────────────────────

  async fn record_review_task(&self, input: NewReviewTask) -> Result<ReviewTask> {
    let task = ReviewTask {
      task_id:     Uuid::new_v4(),
      created_at:  Utc::now(),
      entity_id:   input.entity_id,
      field_key:   input.field_key,
      severity:    input.severity,
      reason:      input.reason,
      evidence_id: input.evidence_id,
      url:         input.url,
      status:      certify_core::review::ReviewStatus::Open,
    };

    let row = task.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO review_tasks (
             task_id, created_at, entity_id, field_key, severity, reason, evidence_id, url
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            encode_uuid(row.task_id),
            encode_dt(row.created_at),
            row.entity_id.map(encode_uuid),
            row.field_key,
            row.severity.as_str(),
            row.reason,
            row.evidence_id.map(encode_uuid),
            row.url,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(task)
  }

  async fn list_review_tasks(&self, open_only: bool) -> Result<Vec<ReviewTask>> {
    let raws: Vec<RawReviewTask> = self
      .conn
      .call(move |conn| {
        let filter = if open_only { "WHERE r.task_id IS NULL" } else { "" };
        let mut stmt =
          conn.prepare(&format!("{} {filter} ORDER BY t.seq", RawReviewTask::SELECT))?;
        let rows = stmt
          .query_map([], RawReviewTask::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReviewTask::into_task).collect()
  }

  async fn resolve_review_task(&self, task_id: Uuid, note: Option<String>) -> Result<Resolution> {
    let resolution = Resolution {
      resolution_id: Uuid::new_v4(),
      task_id,
      note,
      recorded_at: Utc::now(),
    };

    let row = resolution.clone();
    let state = self
      .close_once(
        "SELECT 1 FROM review_tasks WHERE task_id = ?1",
        "SELECT 1 FROM review_resolutions WHERE task_id = ?1",
        task_id,
        move |conn| {
          conn.execute(
            "INSERT INTO review_resolutions (resolution_id, task_id, note, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
              encode_uuid(row.resolution_id),
              encode_uuid(row.task_id),
              row.note,
              encode_dt(row.recorded_at),
            ],
          )?;
          Ok(())
        },
      )
      .await?;

    match state {
      Lifecycle::Missing => Err(Error::ReviewTaskNotFound(task_id)),
      Lifecycle::Closed => Err(Error::AlreadyResolved(task_id)),
      Lifecycle::Open => Ok(resolution),
    }
  }

  // ── Run log ───────────────────────────────────────────────────────────────

  async fn start_run(&self, mode: RunMode) -> Result<Run> {
    let run = Run {
      run_id:          Uuid::new_v4(),
      started_at_utc:  Utc::now(),
      mode,
      status:          RunStatus::Running,
      notes:           None,
      finished_at_utc: None,
    };

    let id_str = encode_uuid(run.run_id);
    let at_str = encode_dt(run.started_at_utc);
    let mode_str = mode.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO runs (run_id, started_at_utc, mode) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, at_str, mode_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(run)
  }

  async fn finish_run(&self, run_id: Uuid, outcome: RunOutcome) -> Result<Run> {
    if !outcome.status.is_terminal() {
      return Err(Error::NonTerminalOutcome);
    }

    let id_str = encode_uuid(run_id);
    let status_str = outcome.status.as_str();
    let at_str = encode_dt(Utc::now());

    let state = self
      .close_once(
        "SELECT 1 FROM runs WHERE run_id = ?1",
        "SELECT 1 FROM run_outcomes WHERE run_id = ?1",
        run_id,
        move |conn| {
          conn.execute(
            "INSERT INTO run_outcomes (run_id, status, notes, finished_at_utc)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id_str, status_str, outcome.notes, at_str],
          )?;
          Ok(())
        },
      )
      .await?;

    match state {
      Lifecycle::Missing => return Err(Error::RunNotFound(run_id)),
      Lifecycle::Closed => return Err(Error::RunAlreadyFinished(run_id)),
      Lifecycle::Open => {}
    }

    self.get_run(run_id).await?.ok_or(Error::RunNotFound(run_id))
  }

  async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>> {
    let id_str = encode_uuid(run_id);

    let raw: Option<RawRun> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("{} WHERE r.run_id = ?1", RawRun::SELECT),
              rusqlite::params![id_str],
              RawRun::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRun::into_run).transpose()
  }

  async fn list_runs(&self) -> Result<Vec<Run>> {
    let raws: Vec<RawRun> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("{} ORDER BY r.seq DESC", RawRun::SELECT))?;
        let rows = stmt
          .query_map([], RawRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRun::into_run).collect()
  }

  // ── Dependent views ───────────────────────────────────────────────────────

  async fn refresh_views(&self) -> Result<usize> {
    let now_str = encode_dt(Utc::now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entity_summaries", [])?;
        let written = tx.execute(
          &format!(
            "INSERT INTO entity_summaries ({SUMMARY_COLS})
             SELECT
               e.entity_id, e.canonical_name, e.domain, e.status,
               (SELECT COUNT(*) FROM evidence v WHERE v.entity_id = e.entity_id),
               (SELECT COUNT(*) FROM claim_versions c WHERE c.entity_id = e.entity_id),
               (SELECT COUNT(*)
                  FROM review_tasks t
                  LEFT JOIN review_resolutions r ON r.task_id = t.task_id
                 WHERE t.entity_id = e.entity_id AND r.task_id IS NULL),
               (SELECT MAX(v.fetched_at) FROM evidence v WHERE v.entity_id = e.entity_id),
               ?1
             FROM entities e"
          ),
          rusqlite::params![now_str],
        )?;
        tx.commit()?;
        Ok(written)
      })
      .await?;

    tracing::debug!(written, "entity summaries refreshed");
    Ok(written)
  }

  async fn list_entity_summaries(&self) -> Result<Vec<EntitySummary>> {
    let raws: Vec<RawSummary> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUMMARY_COLS} FROM entity_summaries ORDER BY canonical_name"
        ))?;
        let rows = stmt
          .query_map([], RawSummary::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSummary::into_summary).collect()
  }
}
