//! The `IntelStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `certify-store-sqlite`).
//! The pipeline and the CLI depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  allowlist::SourceRule,
  claim::{ClaimCandidate, ClaimVersion, NewCandidate, NewClaimVersion},
  entity::{Entity, EntityStatus, NewEntity, UpsertOutcome},
  event::{Acknowledgement, AlertRule, Event, EventType, NewEvent},
  evidence::{Evidence, NewEvidence, NewSnapshot, Snapshot},
  review::{NewReviewTask, Resolution, ReviewTask},
  run::{Run, RunMode, RunOutcome},
  view::EntitySummary,
};

/// Abstraction over a Certify Intel store backend.
///
/// Evidence, snapshots, candidates, claim versions, events, review tasks and
/// runs are append-only. Closing an event, resolving a task and finishing a
/// run are expressed as separate append-only records. Entities are upserted
/// by domain; sources and alert rules are plain reference tables.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait IntelStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Allowlist ─────────────────────────────────────────────────────────

  /// Insert or replace the row for `rule.source_key`.
  fn upsert_source(
    &self,
    rule: SourceRule,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_source<'a>(
    &'a self,
    source_key: &'a str,
  ) -> impl Future<Output = Result<Option<SourceRule>, Self::Error>> + Send + 'a;

  fn list_sources(
    &self,
  ) -> impl Future<Output = Result<Vec<SourceRule>, Self::Error>> + Send + '_;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create an entity for a new domain, or overwrite only the
  /// `canonical_name` of the entity already holding that domain.
  fn upsert_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<(Entity, UpsertOutcome), Self::Error>> + Send + '_;

  fn get_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// All entities in discovery order.
  fn list_entities(
    &self,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  fn set_entity_status(
    &self,
    entity_id: Uuid,
    status: EntityStatus,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  // ── Evidence & snapshots (append-only) ────────────────────────────────

  fn record_evidence(
    &self,
    input: NewEvidence,
  ) -> impl Future<Output = Result<Evidence, Self::Error>> + Send + '_;

  fn list_evidence(
    &self,
    entity_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Evidence>, Self::Error>> + Send + '_;

  fn record_snapshot(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// All snapshots in storage (insertion) order.
  fn list_snapshots(
    &self,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;

  // ── Candidates & claims (append-only) ─────────────────────────────────

  /// Persist a candidate, computing `status_final` at write time.
  fn record_candidate(
    &self,
    input: NewCandidate,
  ) -> impl Future<Output = Result<ClaimCandidate, Self::Error>> + Send + '_;

  fn list_candidates(
    &self,
  ) -> impl Future<Output = Result<Vec<ClaimCandidate>, Self::Error>> + Send + '_;

  /// Mint a new version. A fresh `claim_id` is generated unless the input
  /// names one.
  fn record_claim_version(
    &self,
    input: NewClaimVersion,
  ) -> impl Future<Output = Result<ClaimVersion, Self::Error>> + Send + '_;

  fn list_claim_versions(
    &self,
    entity_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<ClaimVersion>, Self::Error>> + Send + '_;

  /// The most recently minted version for `(entity_id, field_key)`.
  fn latest_claim_version<'a>(
    &'a self,
    entity_id: Uuid,
    field_key: &'a str,
  ) -> impl Future<Output = Result<Option<ClaimVersion>, Self::Error>> + Send + 'a;

  // ── Events ────────────────────────────────────────────────────────────

  fn record_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  /// Events with their status resolved; `open_only` drops acknowledged ones.
  fn list_events(
    &self,
    open_only: bool,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  /// Close an event. Errors if it does not exist or is already closed.
  fn acknowledge_event(
    &self,
    event_id: Uuid,
    note: Option<String>,
  ) -> impl Future<Output = Result<Acknowledgement, Self::Error>> + Send + '_;

  fn count_open_events(
    &self,
    event_type: EventType,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Alert rules ───────────────────────────────────────────────────────

  /// Insert or replace a rule's name and enabled flag. An existing
  /// `last_fired_at_utc` is preserved.
  fn upsert_alert_rule(
    &self,
    rule: AlertRule,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_alert_rules(
    &self,
  ) -> impl Future<Output = Result<Vec<AlertRule>, Self::Error>> + Send + '_;

  fn mark_rule_fired<'a>(
    &'a self,
    rule_key: &'a str,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Review queue ──────────────────────────────────────────────────────

  fn record_review_task(
    &self,
    input: NewReviewTask,
  ) -> impl Future<Output = Result<ReviewTask, Self::Error>> + Send + '_;

  fn list_review_tasks(
    &self,
    open_only: bool,
  ) -> impl Future<Output = Result<Vec<ReviewTask>, Self::Error>> + Send + '_;

  /// Close a task. Errors if it does not exist or is already resolved.
  fn resolve_review_task(
    &self,
    task_id: Uuid,
    note: Option<String>,
  ) -> impl Future<Output = Result<Resolution, Self::Error>> + Send + '_;

  // ── Run log ───────────────────────────────────────────────────────────

  /// Insert a run row; its status is `running` until [`Self::finish_run`].
  fn start_run(
    &self,
    mode: RunMode,
  ) -> impl Future<Output = Result<Run, Self::Error>> + Send + '_;

  /// Record a run's terminal outcome. Errors if the run is unknown, already
  /// finished, or `outcome.status` is not terminal.
  fn finish_run(
    &self,
    run_id: Uuid,
    outcome: RunOutcome,
  ) -> impl Future<Output = Result<Run, Self::Error>> + Send + '_;

  fn get_run(
    &self,
    run_id: Uuid,
  ) -> impl Future<Output = Result<Option<Run>, Self::Error>> + Send + '_;

  /// All runs, most recent first.
  fn list_runs(
    &self,
  ) -> impl Future<Output = Result<Vec<Run>, Self::Error>> + Send + '_;

  // ── Dependent views ───────────────────────────────────────────────────

  /// Rebuild every entity summary from the base tables. Returns the number
  /// of summaries written.
  fn refresh_views(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn list_entity_summaries(
    &self,
  ) -> impl Future<Output = Result<Vec<EntitySummary>, Self::Error>> + Send + '_;
}
