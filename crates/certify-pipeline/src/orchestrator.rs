//! The pipeline orchestrator.
//!
//! A run is logged before any stage starts and closed with exactly one
//! outcome. Stage errors stop the run and are recorded as a failed outcome;
//! whatever earlier stages wrote stays in place.

use std::future::Future;

use certify_core::{
  run::{Run, RunMode, RunOutcome, RunStatus},
  store::IntelStore,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  Error, PipelineConfig, Result,
  alerts::{self, AlertReport},
  diff::{self, DiffReport},
  discovery::{self, DiscoveryReport},
  evidence::{self, EvidenceReport},
  extract::ExtractorRegistry,
  fetch::Fetcher,
  promote::{self, PromotionReport},
};

// ─── Run context ─────────────────────────────────────────────────────────────

/// State threaded through every stage of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub run_id: Uuid,
  pub mode:   RunMode,
  pub cancel: CancellationToken,
}

impl RunContext {
  pub fn new(run_id: Uuid, mode: RunMode, cancel: CancellationToken) -> Self {
    Self { run_id, mode, cancel }
  }

  /// `Err(Cancelled)` once the token has been cancelled.
  pub fn checkpoint(&self) -> Result<()> {
    if self.cancel.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
  }

  /// Drive `fut` to completion unless the run is cancelled first.
  pub async fn race<F: Future>(&self, fut: F) -> Result<F::Output> {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(Error::Cancelled),
      out = fut => Ok(out),
    }
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// The finished run row plus the report of every stage that completed.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
  pub run:             Run,
  pub discovery:       Option<DiscoveryReport>,
  pub evidence:        Option<EvidenceReport>,
  pub promotion:       Option<PromotionReport>,
  pub diff:            Option<DiffReport>,
  pub alerts:          Option<AlertReport>,
  pub views_refreshed: Option<usize>,
}

impl RunSummary {
  fn new(run: Run) -> Self {
    Self {
      run,
      discovery: None,
      evidence: None,
      promotion: None,
      diff: None,
      alerts: None,
      views_refreshed: None,
    }
  }

  pub fn succeeded(&self) -> bool { self.run.status == RunStatus::Completed }

  /// One-line digest stored as the notes of a completed run.
  fn notes(&self) -> String {
    let mut parts = Vec::new();
    match &self.discovery {
      Some(d) => parts.push(format!(
        "discovery: {} results, {} created, {} renamed",
        d.results, d.created, d.renamed
      )),
      None => parts.push("discovery: skipped".to_owned()),
    }
    if let Some(e) = &self.evidence {
      parts.push(format!(
        "evidence: {} fetched, {} blocked, {} failed",
        e.fetched, e.blocked, e.failed
      ));
    }
    if let Some(p) = &self.promotion {
      parts.push(format!("promotion: {} minted", p.promoted));
    }
    if let Some(d) = &self.diff {
      parts.push(format!("diff: {} events", d.events));
    }
    if let Some(a) = &self.alerts {
      parts.push(format!("alerts: {} fired", a.fired.len()));
    }
    parts.join("; ")
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct Pipeline<S, F> {
  store:      S,
  fetcher:    F,
  config:     PipelineConfig,
  extractors: ExtractorRegistry,
}

impl<S, F> Pipeline<S, F>
where
  S: IntelStore,
  F: Fetcher,
{
  /// A pipeline with the built-in extractors.
  pub fn new(store: S, fetcher: F, config: PipelineConfig) -> Result<Self> {
    Ok(Self {
      store,
      fetcher,
      config,
      extractors: ExtractorRegistry::with_defaults()?,
    })
  }

  pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
    self.extractors = extractors;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  /// Execute one run. Only a failure to open or close the run log is
  /// returned as `Err`; anything that goes wrong in between is recorded on
  /// the run itself.
  pub async fn run(&mut self, mode: RunMode, cancel: CancellationToken) -> Result<RunSummary> {
    let run = self.store.start_run(mode).await.map_err(Error::store)?;
    let ctx = RunContext::new(run.run_id, mode, cancel);
    tracing::info!(run_id = %ctx.run_id, %mode, "run started");

    let mut summary = RunSummary::new(run);
    let outcome = match self.run_stages(&ctx, &mut summary).await {
      Ok(()) => RunOutcome::completed(summary.notes()),
      Err(Error::Cancelled) => {
        tracing::warn!(run_id = %ctx.run_id, "run cancelled");
        RunOutcome::failed(Error::Cancelled.to_string())
      }
      Err(e) => {
        tracing::error!(run_id = %ctx.run_id, error = %e, "run failed");
        RunOutcome::failed(e.to_string())
      }
    };

    summary.run = self
      .store
      .finish_run(ctx.run_id, outcome)
      .await
      .map_err(Error::store)?;
    tracing::info!(run_id = %ctx.run_id, status = %summary.run.status, "run finished");
    Ok(summary)
  }

  async fn run_stages(&self, ctx: &RunContext, summary: &mut RunSummary) -> Result<()> {
    ctx.checkpoint()?;
    self.seed_reference_tables().await?;

    if ctx.mode.runs_discovery() {
      ctx.checkpoint()?;
      let report =
        discovery::discover(&self.store, &self.fetcher, &self.config.discovery, ctx).await?;
      summary.discovery = Some(report);
    }

    ctx.checkpoint()?;
    let report = evidence::collect(
      &self.store,
      &self.fetcher,
      &self.extractors,
      &self.config.evidence,
      ctx,
    )
    .await?;
    summary.evidence = Some(report);

    ctx.checkpoint()?;
    summary.promotion = Some(promote::promote(&self.store, &self.config.promotion, ctx).await?);

    ctx.checkpoint()?;
    summary.diff = Some(diff::record_changes(&self.store, ctx).await?);

    ctx.checkpoint()?;
    summary.alerts = Some(alerts::evaluate(&self.store, ctx).await?);

    ctx.checkpoint()?;
    let refreshed = self.store.refresh_views().await.map_err(Error::store)?;
    summary.views_refreshed = Some(refreshed);

    Ok(())
  }

  /// Upsert the configured allowlist rows and alert rules.
  async fn seed_reference_tables(&self) -> Result<()> {
    for rule in &self.config.sources {
      self
        .store
        .upsert_source(rule.clone())
        .await
        .map_err(Error::store)?;
    }
    for rule in &self.config.alert_rules {
      self
        .store
        .upsert_alert_rule(rule.clone())
        .await
        .map_err(Error::store)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use certify_core::{
    allowlist::SourceRule,
    event::{AlertRule, EVIDENCE_CHANGED_ANY},
  };

  use super::*;
  use crate::{
    config::{DiscoveryConfig, PromotionConfig, PromotionPolicy},
    extract::{Extraction, Extractor, Finding, PRICING_ACV},
    testing::{BrokenCandidates, ScriptedFetcher, store},
  };

  const SEARCH: &str = "https://search.test/";
  const HITS: &str = r#"{ "webPages": { "value": [
    { "name": "Acme Credentialing", "url": "https://www.acme.com/" }
  ] } }"#;

  fn config() -> PipelineConfig {
    PipelineConfig {
      discovery: DiscoveryConfig {
        api_key: Some("key".into()),
        endpoint: SEARCH.into(),
        ..DiscoveryConfig::default()
      },
      sources: vec![SourceRule::for_domain("Company_Site", "acme.com")],
      alert_rules: vec![AlertRule::new(EVIDENCE_CHANGED_ANY, "Any evidence changed")],
      ..PipelineConfig::default()
    }
  }

  #[tokio::test]
  async fn full_run_completes_end_to_end() {
    let fetcher = ScriptedFetcher::new()
      .respond(SEARCH, 200, HITS)
      .respond("https://acme.com/", 200, "Annual plan: $9,600 per year");
    let mut pipeline = Pipeline::new(store().await, fetcher, config()).unwrap();

    let summary = pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();
    assert!(summary.succeeded(), "{:?}", summary.run.notes);
    assert_eq!(summary.discovery.as_ref().unwrap().created, 1);
    assert_eq!(summary.evidence.as_ref().unwrap().fetched, 1);
    assert_eq!(summary.promotion.as_ref().unwrap().promoted, 1);
    assert_eq!(summary.diff.as_ref().unwrap().events, 0);
    assert_eq!(summary.views_refreshed, Some(1));
    assert!(summary.run.finished_at_utc.is_some());
    assert!(summary.run.notes.as_deref().unwrap().contains("promotion: 1 minted"));

    let s = pipeline.store();
    let claims = s.list_claim_versions(None).await.unwrap();
    assert_eq!(claims[0].value_num, Some(9600.0));
    let summaries = s.list_entity_summaries().await.unwrap();
    assert_eq!(summaries[0].evidence_count, 1);
    assert_eq!(summaries[0].claim_version_count, 1);
    assert_eq!(s.list_runs().await.unwrap()[0].status, RunStatus::Completed);
  }

  #[tokio::test]
  async fn invalid_search_endpoint_does_not_stop_the_run() {
    let s = store().await;
    s.upsert_entity(certify_core::entity::NewEntity::new("Acme", "acme.com", "manual"))
      .await
      .unwrap();
    let fetcher = ScriptedFetcher::new().respond("https://acme.com/", 200, "$9,600 per year");
    let mut cfg = config();
    cfg.discovery.endpoint = "not a url".into();
    let mut pipeline = Pipeline::new(s.clone(), fetcher, cfg).unwrap();

    let summary = pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();
    assert!(summary.succeeded(), "{:?}", summary.run.notes);
    assert_eq!(summary.discovery.as_ref().unwrap().review_tasks, 1);
    assert_eq!(summary.evidence.as_ref().unwrap().fetched, 1);
    assert_eq!(summary.promotion.as_ref().unwrap().promoted, 1);

    let tasks = s.list_review_tasks(true).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].reason, "INVALID_ENDPOINT");
  }

  struct Headcount;

  impl Extractor for Headcount {
    fn field_key(&self) -> &str { "headcount" }

    fn extract(&self, text: &str) -> Extraction {
      match text.find("42 employees") {
        Some(at) => Extraction::Found(Finding {
          value_text: "42".into(),
          value_num:  Some(42.0),
          units:      None,
          confidence: 0.9,
          span:       at..at + 2,
          reason:     "STATED_HEADCOUNT".into(),
        }),
        None => Extraction::Missing { confidence: 0.1, reason: "NO_HEADCOUNT".into() },
      }
    }
  }

  #[tokio::test]
  async fn registered_extractors_run_alongside_defaults() {
    let fetcher = ScriptedFetcher::new()
      .respond(SEARCH, 200, HITS)
      .respond("https://acme.com/", 200, "42 employees. $9,600 per year.");
    let mut extractors = ExtractorRegistry::with_defaults().unwrap();
    extractors.register(Headcount);
    let mut pipeline = Pipeline::new(store().await, fetcher, config())
      .unwrap()
      .with_extractors(extractors);

    let summary = pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();
    assert!(summary.succeeded(), "{:?}", summary.run.notes);
    assert_eq!(summary.promotion.as_ref().unwrap().promoted, 2);

    let mut fields: Vec<String> = pipeline
      .store()
      .list_claim_versions(None)
      .await
      .unwrap()
      .into_iter()
      .map(|v| v.field_key)
      .collect();
    fields.sort();
    assert_eq!(fields, vec!["headcount".to_owned(), PRICING_ACV.to_owned()]);
  }

  #[tokio::test]
  async fn empty_registry_stores_evidence_without_candidates() {
    let fetcher = ScriptedFetcher::new()
      .respond(SEARCH, 200, HITS)
      .respond("https://acme.com/", 200, "$9,600 per year");
    let mut pipeline = Pipeline::new(store().await, fetcher, config())
      .unwrap()
      .with_extractors(ExtractorRegistry::default());

    let summary = pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();
    assert!(summary.succeeded(), "{:?}", summary.run.notes);
    assert_eq!(summary.evidence.as_ref().unwrap().fetched, 1);
    assert_eq!(summary.evidence.as_ref().unwrap().candidates, 0);
    assert!(pipeline.store().list_claim_versions(None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn refresh_after_content_change_fires_alert() {
    let s = store().await;
    let first = ScriptedFetcher::new()
      .respond(SEARCH, 200, HITS)
      .respond("https://acme.com/", 200, "v1: $100 per year");
    let mut pipeline = Pipeline::new(s.clone(), first, config()).unwrap();
    pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();

    let second = ScriptedFetcher::new().respond("https://acme.com/", 200, "v2: $120 per year");
    let mut pipeline = Pipeline::new(s.clone(), second, config()).unwrap();
    let summary = pipeline.run(RunMode::Refresh, CancellationToken::new()).await.unwrap();

    assert!(summary.discovery.is_none());
    assert_eq!(summary.diff.as_ref().unwrap().events, 1);
    assert_eq!(summary.alerts.as_ref().unwrap().fired, vec![EVIDENCE_CHANGED_ANY.to_owned()]);
    assert!(summary.run.notes.as_deref().unwrap().starts_with("discovery: skipped"));

    let events = s.list_events(true).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].url, "https://acme.com/");
  }

  #[tokio::test]
  async fn refresh_mode_never_searches() {
    let fetcher = ScriptedFetcher::new().respond(SEARCH, 200, HITS);
    let mut pipeline = Pipeline::new(store().await, fetcher, config()).unwrap();

    let summary = pipeline.run(RunMode::Refresh, CancellationToken::new()).await.unwrap();
    assert!(summary.succeeded());
    assert!(pipeline.fetcher.requests().is_empty());
  }

  #[tokio::test]
  async fn store_failure_marks_run_failed_and_keeps_earlier_writes() {
    let broken = BrokenCandidates { inner: store().await };
    let fetcher = ScriptedFetcher::new()
      .respond(SEARCH, 200, HITS)
      .respond("https://acme.com/", 200, "$5 per year");
    let mut pipeline = Pipeline::new(broken, fetcher, config()).unwrap();

    let summary = pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.run.status, RunStatus::Failed);
    assert!(summary.run.notes.as_deref().unwrap().contains("candidate table unreadable"));
    assert!(summary.evidence.is_some());
    assert!(summary.promotion.is_none());

    let inner = &pipeline.store().inner;
    assert_eq!(inner.list_evidence(None).await.unwrap().len(), 1);
    assert!(inner.list_claim_versions(None).await.unwrap().is_empty());
    assert_eq!(inner.list_runs().await.unwrap()[0].status, RunStatus::Failed);
  }

  #[tokio::test]
  async fn cancellation_mid_fetch_fails_the_run() {
    let cancel = CancellationToken::new();
    let fetcher = ScriptedFetcher::new()
      .respond(SEARCH, 200, HITS)
      .hang("https://acme.com/", Some(cancel.clone()));
    let mut pipeline = Pipeline::new(store().await, fetcher, config()).unwrap();

    let summary = pipeline.run(RunMode::Full, cancel).await.unwrap();
    assert_eq!(summary.run.status, RunStatus::Failed);
    assert_eq!(summary.run.notes.as_deref(), Some("run cancelled"));
    assert!(summary.discovery.is_some());
    assert!(summary.evidence.is_none());

    let s = pipeline.store();
    assert_eq!(s.list_entities().await.unwrap().len(), 1);
    assert!(s.list_evidence(None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn cancelled_before_start_records_failed_run() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut pipeline = Pipeline::new(store().await, ScriptedFetcher::new(), config()).unwrap();

    let summary = pipeline.run(RunMode::Full, cancel).await.unwrap();
    assert_eq!(summary.run.status, RunStatus::Failed);
    assert!(pipeline.fetcher.requests().is_empty());
    assert!(pipeline.store().list_sources().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn chain_policy_is_honoured_across_runs() {
    let s = store().await;
    let cfg = PipelineConfig {
      promotion: PromotionConfig { policy: PromotionPolicy::Chain, ..PromotionConfig::default() },
      ..config()
    };

    for body in ["$100 per year", "$100 per year", "$150 per year"] {
      let fetcher = ScriptedFetcher::new()
        .respond(SEARCH, 200, HITS)
        .respond("https://acme.com/", 200, body);
      let mut pipeline = Pipeline::new(s.clone(), fetcher, cfg.clone()).unwrap();
      pipeline.run(RunMode::Full, CancellationToken::new()).await.unwrap();
    }

    let versions = s.list_claim_versions(None).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].claim_id, versions[1].claim_id);
  }
}
