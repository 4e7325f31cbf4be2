//! Test doubles shared by the stage tests.

use std::sync::Mutex;

use certify_core::{
  allowlist::SourceRule,
  claim::{ClaimCandidate, ClaimVersion, NewCandidate, NewClaimVersion},
  entity::{Entity, EntityStatus, NewEntity, UpsertOutcome},
  event::{Acknowledgement, AlertRule, Event, EventType, NewEvent},
  evidence::{Evidence, NewEvidence, NewSnapshot, Snapshot},
  review::{NewReviewTask, Resolution, ReviewTask},
  run::{Run, RunMode, RunOutcome},
  store::IntelStore,
  view::EntitySummary,
};
use certify_store_sqlite::SqliteStore;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  RunContext,
  fetch::{FetchRequest, FetchResponse, Fetcher},
};

pub(crate) async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

pub(crate) fn context() -> RunContext {
  RunContext::new(Uuid::new_v4(), RunMode::Full, CancellationToken::new())
}

// ─── Fetcher ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
  Respond(FetchResponse),
  /// Never answers; cancels the token first, if one is given.
  Hang(Option<CancellationToken>),
}

/// Answers requests by URL prefix, first rule wins. Unmatched URLs look like
/// a transport failure. Every request is recorded.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
  rules: Vec<(String, Reply)>,
  sent:  Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
  pub(crate) fn new() -> Self { Self::default() }

  pub(crate) fn respond(mut self, prefix: impl Into<String>, status: u16, body: &str) -> Self {
    let reply = Reply::Respond(FetchResponse { status, body: body.to_owned() });
    self.rules.push((prefix.into(), reply));
    self
  }

  pub(crate) fn hang(mut self, prefix: impl Into<String>, cancel: Option<CancellationToken>) -> Self {
    self.rules.push((prefix.into(), Reply::Hang(cancel)));
    self
  }

  pub(crate) fn requests(&self) -> Vec<FetchRequest> {
    self.sent.lock().expect("request log").clone()
  }
}

impl Fetcher for ScriptedFetcher {
  async fn get(&self, request: FetchRequest) -> FetchResponse {
    let reply = self
      .rules
      .iter()
      .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
      .map(|(_, reply)| reply.clone());
    self.sent.lock().expect("request log").push(request);

    match reply {
      Some(Reply::Respond(resp)) => resp,
      Some(Reply::Hang(cancel)) => {
        if let Some(token) = cancel {
          token.cancel();
        }
        std::future::pending().await
      }
      None => FetchResponse::transport_failure(),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Delegates to an in-memory [`SqliteStore`] but fails every
/// `list_candidates` call.
pub(crate) struct BrokenCandidates {
  pub(crate) inner: SqliteStore,
}

type StoreResult<T> = Result<T, certify_store_sqlite::Error>;

impl IntelStore for BrokenCandidates {
  type Error = certify_store_sqlite::Error;

  async fn upsert_source(&self, rule: SourceRule) -> StoreResult<()> {
    self.inner.upsert_source(rule).await
  }

  async fn get_source(&self, source_key: &str) -> StoreResult<Option<SourceRule>> {
    self.inner.get_source(source_key).await
  }

  async fn list_sources(&self) -> StoreResult<Vec<SourceRule>> { self.inner.list_sources().await }

  async fn upsert_entity(&self, input: NewEntity) -> StoreResult<(Entity, UpsertOutcome)> {
    self.inner.upsert_entity(input).await
  }

  async fn get_entity(&self, entity_id: Uuid) -> StoreResult<Option<Entity>> {
    self.inner.get_entity(entity_id).await
  }

  async fn list_entities(&self) -> StoreResult<Vec<Entity>> { self.inner.list_entities().await }

  async fn set_entity_status(&self, entity_id: Uuid, status: EntityStatus) -> StoreResult<Entity> {
    self.inner.set_entity_status(entity_id, status).await
  }

  async fn record_evidence(&self, input: NewEvidence) -> StoreResult<Evidence> {
    self.inner.record_evidence(input).await
  }

  async fn list_evidence(&self, entity_id: Option<Uuid>) -> StoreResult<Vec<Evidence>> {
    self.inner.list_evidence(entity_id).await
  }

  async fn record_snapshot(&self, input: NewSnapshot) -> StoreResult<Snapshot> {
    self.inner.record_snapshot(input).await
  }

  async fn list_snapshots(&self) -> StoreResult<Vec<Snapshot>> { self.inner.list_snapshots().await }

  async fn record_candidate(&self, input: NewCandidate) -> StoreResult<ClaimCandidate> {
    self.inner.record_candidate(input).await
  }

  async fn list_candidates(&self) -> StoreResult<Vec<ClaimCandidate>> {
    Err(certify_store_sqlite::Error::Decode("candidate table unreadable".into()))
  }

  async fn record_claim_version(&self, input: NewClaimVersion) -> StoreResult<ClaimVersion> {
    self.inner.record_claim_version(input).await
  }

  async fn list_claim_versions(&self, entity_id: Option<Uuid>) -> StoreResult<Vec<ClaimVersion>> {
    self.inner.list_claim_versions(entity_id).await
  }

  async fn latest_claim_version(
    &self,
    entity_id: Uuid,
    field_key: &str,
  ) -> StoreResult<Option<ClaimVersion>> {
    self.inner.latest_claim_version(entity_id, field_key).await
  }

  async fn record_event(&self, input: NewEvent) -> StoreResult<Event> {
    self.inner.record_event(input).await
  }

  async fn list_events(&self, open_only: bool) -> StoreResult<Vec<Event>> {
    self.inner.list_events(open_only).await
  }

  async fn acknowledge_event(
    &self,
    event_id: Uuid,
    note: Option<String>,
  ) -> StoreResult<Acknowledgement> {
    self.inner.acknowledge_event(event_id, note).await
  }

  async fn count_open_events(&self, event_type: EventType) -> StoreResult<u64> {
    self.inner.count_open_events(event_type).await
  }

  async fn upsert_alert_rule(&self, rule: AlertRule) -> StoreResult<()> {
    self.inner.upsert_alert_rule(rule).await
  }

  async fn list_alert_rules(&self) -> StoreResult<Vec<AlertRule>> {
    self.inner.list_alert_rules().await
  }

  async fn mark_rule_fired(&self, rule_key: &str, at: DateTime<Utc>) -> StoreResult<()> {
    self.inner.mark_rule_fired(rule_key, at).await
  }

  async fn record_review_task(&self, input: NewReviewTask) -> StoreResult<ReviewTask> {
    self.inner.record_review_task(input).await
  }

  async fn list_review_tasks(&self, open_only: bool) -> StoreResult<Vec<ReviewTask>> {
    self.inner.list_review_tasks(open_only).await
  }

  async fn resolve_review_task(&self, task_id: Uuid, note: Option<String>) -> StoreResult<Resolution> {
    self.inner.resolve_review_task(task_id, note).await
  }

  async fn start_run(&self, mode: RunMode) -> StoreResult<Run> { self.inner.start_run(mode).await }

  async fn finish_run(&self, run_id: Uuid, outcome: RunOutcome) -> StoreResult<Run> {
    self.inner.finish_run(run_id, outcome).await
  }

  async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>> {
    self.inner.get_run(run_id).await
  }

  async fn list_runs(&self) -> StoreResult<Vec<Run>> { self.inner.list_runs().await }

  async fn refresh_views(&self) -> StoreResult<usize> { self.inner.refresh_views().await }

  async fn list_entity_summaries(&self) -> StoreResult<Vec<EntitySummary>> {
    self.inner.list_entity_summaries().await
  }
}
