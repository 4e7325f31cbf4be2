//! Evidence collection: allowlist, fetch, persist, extract.
//!
//! Each active entity's homepage is checked against the allowlist, fetched,
//! stored as an evidence row plus a snapshot, and handed to the extractor
//! registry. A blocked or failed fetch raises a review task and writes
//! nothing else for that entity.

use certify_core::{
  allowlist::{self, DEFAULT_TIER},
  entity::{Entity, EntityStatus},
  evidence::{NewEvidence, NewSnapshot},
  review::{NewReviewTask, ReviewReason},
  store::IntelStore,
};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;

use crate::{
  Error, Result, RunContext,
  config::EvidenceConfig,
  extract::{self, ExtractionTally, ExtractorRegistry},
  fetch::{FetchRequest, Fetcher},
  hash, review,
};

/// What an evidence pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvidenceReport {
  /// Entities considered for a fetch.
  pub visited:      usize,
  /// Inactive entities and entities without a domain.
  pub skipped:      usize,
  pub fetched:      usize,
  /// Refused by the allowlist.
  pub blocked:      usize,
  /// Non-200 responses, empty bodies and transport failures.
  pub failed:       usize,
  pub candidates:   usize,
  pub promotable:   usize,
  pub review_tasks: usize,
}

enum Visit {
  Blocked,
  Failed,
  Fetched(ExtractionTally),
}

impl EvidenceReport {
  fn absorb(&mut self, visit: Visit) {
    self.visited += 1;
    match visit {
      Visit::Blocked => {
        self.blocked += 1;
        self.review_tasks += 1;
      }
      Visit::Failed => {
        self.failed += 1;
        self.review_tasks += 1;
      }
      Visit::Fetched(tally) => {
        self.fetched += 1;
        self.candidates += tally.candidates;
        self.promotable += tally.promoted;
        self.review_tasks += tally.review_tasks;
      }
    }
  }
}

/// The page fetched as evidence for `domain`.
pub fn homepage_url(domain: &str) -> String { format!("https://{domain}/") }

pub async fn collect<S, F>(
  store: &S,
  fetcher: &F,
  registry: &ExtractorRegistry,
  config: &EvidenceConfig,
  ctx: &RunContext,
) -> Result<EvidenceReport>
where
  S: IntelStore,
  F: Fetcher,
{
  let entities = store.list_entities().await.map_err(Error::store)?;
  let (targets, skipped): (Vec<Entity>, Vec<Entity>) = entities
    .into_iter()
    .partition(|e| e.status == EntityStatus::Active && !e.domain.trim().is_empty());

  let init = EvidenceReport { skipped: skipped.len(), ..EvidenceReport::default() };
  if registry.is_empty() {
    tracing::warn!("no extractors registered, evidence will yield no candidates");
  }
  tracing::info!(targets = targets.len(), skipped = init.skipped, "collecting evidence");

  let report = stream::iter(targets)
    .map(|entity| visit(store, fetcher, registry, config, ctx, entity))
    .buffer_unordered(config.concurrency.max(1))
    .try_fold(init, |mut report, visit| async move {
      report.absorb(visit);
      Ok::<_, Error>(report)
    })
    .await?;

  tracing::info!(
    fetched = report.fetched,
    blocked = report.blocked,
    failed = report.failed,
    candidates = report.candidates,
    "evidence collected"
  );
  Ok(report)
}

async fn visit<S, F>(
  store: &S,
  fetcher: &F,
  registry: &ExtractorRegistry,
  config: &EvidenceConfig,
  ctx: &RunContext,
  entity: Entity,
) -> Result<Visit>
where
  S: IntelStore,
  F: Fetcher,
{
  ctx.checkpoint()?;
  let url = homepage_url(&entity.domain);

  let rule = store
    .get_source(&config.source_key)
    .await
    .map_err(Error::store)?;
  let decision = allowlist::check(rule.as_ref(), &entity.domain);
  if !decision.is_ok() {
    let task = NewReviewTask::new(&ReviewReason::AllowlistFail(decision))
      .entity(entity.entity_id)
      .url(url.as_str());
    review::raise(store, task).await?;
    return Ok(Visit::Blocked);
  }
  let tier = rule.map_or_else(|| DEFAULT_TIER.to_owned(), |r| r.tier);

  let response = ctx
    .race(fetcher.get(FetchRequest::get(url.as_str(), config.timeout())))
    .await?;
  if !response.is_ok() || response.body.is_empty() {
    let task = NewReviewTask::new(&ReviewReason::FetchFailHttp(response.status))
      .entity(entity.entity_id)
      .url(url.as_str());
    review::raise(store, task).await?;
    return Ok(Visit::Failed);
  }

  let body = response.body;
  let text_hash = hash::text_hash(&body);

  let evidence = store
    .record_evidence(NewEvidence {
      entity_id:    entity.entity_id,
      source_key:   config.source_key.clone(),
      tier,
      url:          url.clone(),
      snippet:      hash::snippet(&body, config.snippet_len),
      text_hash:    text_hash.clone(),
      domain_calc:  entity.domain.clone(),
      allowlist_ok: true,
    })
    .await
    .map_err(Error::store)?;

  store
    .record_snapshot(NewSnapshot {
      url:         url.clone(),
      domain:      entity.domain.clone(),
      source_key:  config.source_key.clone(),
      entity_id:   Some(entity.entity_id),
      http_status: response.status,
      text_hash,
      text_len:    body.chars().count(),
      notes:       None,
    })
    .await
    .map_err(Error::store)?;

  tracing::debug!(
    entity_id = %entity.entity_id,
    url = %url,
    evidence_id = %evidence.evidence_id,
    "evidence recorded"
  );

  let tally = extract::record_candidates(store, registry, &entity, &evidence, &body).await?;
  Ok(Visit::Fetched(tally))
}

#[cfg(test)]
mod tests {
  use certify_core::{
    allowlist::SourceRule,
    claim::StatusFinal,
    entity::{EntityStatus, NewEntity},
    store::IntelStore,
  };

  use super::*;
  use crate::testing::{ScriptedFetcher, context, store};

  async fn seed(s: &impl IntelStore, domain: &str) -> Entity {
    let (e, _) = s
      .upsert_entity(NewEntity::new(domain, domain, "manual"))
      .await
      .unwrap();
    e
  }

  fn registry() -> ExtractorRegistry { ExtractorRegistry::with_defaults().unwrap() }

  #[tokio::test]
  async fn allowlisted_price_page_yields_promoted_candidate() {
    let s = store().await;
    s.upsert_source(SourceRule::for_domain("Company_Site", "acme.com"))
      .await
      .unwrap();
    let acme = seed(&s, "acme.com").await;
    let fetcher = ScriptedFetcher::new().respond(
      "https://acme.com/",
      200,
      "<p>Enterprise: $24,000 per year</p>",
    );

    let report = collect(&s, &fetcher, &registry(), &EvidenceConfig::default(), &context())
      .await
      .unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.promotable, 1);

    let evidence = s.list_evidence(Some(acme.entity_id)).await.unwrap();
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence[0].url, "https://acme.com/");
    assert_eq!(evidence[0].tier, "TIER1");
    assert_eq!(evidence[0].text_hash, hash::text_hash("<p>Enterprise: $24,000 per year</p>"));

    let snapshots = s.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].http_status, 200);
    assert_eq!(snapshots[0].text_hash, evidence[0].text_hash);

    let candidates = s.list_candidates().await.unwrap();
    assert_eq!(candidates[0].value_num, Some(24000.0));
    assert_eq!(candidates[0].status_final, StatusFinal::Promoted);
    assert_eq!(candidates[0].evidence_id, Some(evidence[0].evidence_id));
    assert!(s.list_review_tasks(true).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn disallowed_domain_is_never_fetched() {
    let s = store().await;
    s.upsert_source(SourceRule::for_domain("Company_Site", "acme.com"))
      .await
      .unwrap();
    let other = seed(&s, "other.com").await;
    let fetcher = ScriptedFetcher::new().respond("https://other.com/", 200, "$1 per year");

    let report = collect(&s, &fetcher, &registry(), &EvidenceConfig::default(), &context())
      .await
      .unwrap();
    assert_eq!(report.blocked, 1);

    let tasks = s.list_review_tasks(true).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].reason, "ALLOWLIST_FAIL:DOMAIN_NOT_ALLOWED");
    assert_eq!(tasks[0].entity_id, Some(other.entity_id));
    assert_eq!(tasks[0].url.as_deref(), Some("https://other.com/"));

    assert!(fetcher.requests().is_empty());
    assert!(s.list_evidence(None).await.unwrap().is_empty());
    assert!(s.list_snapshots().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn missing_source_row_blocks_everything() {
    let s = store().await;
    seed(&s, "acme.com").await;

    collect(&s, &ScriptedFetcher::new(), &registry(), &EvidenceConfig::default(), &context())
      .await
      .unwrap();

    let tasks = s.list_review_tasks(true).await.unwrap();
    assert_eq!(tasks[0].reason, "ALLOWLIST_FAIL:SOURCE_NOT_FOUND");
  }

  #[tokio::test]
  async fn unpriced_page_yields_unknown_candidate_and_task() {
    let s = store().await;
    s.upsert_source(SourceRule::any_domain("Company_Site")).await.unwrap();
    let acme = seed(&s, "acme.com").await;
    let fetcher = ScriptedFetcher::new().respond("https://acme.com/", 200, "Contact sales");

    collect(&s, &fetcher, &registry(), &EvidenceConfig::default(), &context())
      .await
      .unwrap();

    let candidates = s.list_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].value_text, "UNKNOWN");
    assert_eq!(candidates[0].confidence, 0.2);
    assert_eq!(candidates[0].status_final, StatusFinal::ReviewRequired);

    let tasks = s.list_review_tasks(true).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].reason, "NO_EXPLICIT_ACV");
    assert_eq!(tasks[0].field_key.as_deref(), Some("pricing_acv"));
    assert_eq!(tasks[0].entity_id, Some(acme.entity_id));
    assert_eq!(tasks[0].evidence_id, candidates[0].evidence_id);
  }

  #[tokio::test]
  async fn failed_fetches_raise_tasks_without_evidence() {
    let s = store().await;
    s.upsert_source(SourceRule::any_domain("Company_Site")).await.unwrap();
    seed(&s, "down.com").await;
    seed(&s, "empty.com").await;
    seed(&s, "gone.com").await;
    let fetcher = ScriptedFetcher::new()
      .respond("https://empty.com/", 200, "")
      .respond("https://gone.com/", 404, "not found");

    let report = collect(&s, &fetcher, &registry(), &EvidenceConfig::default(), &context())
      .await
      .unwrap();
    assert_eq!(report.failed, 3);

    let mut reasons: Vec<String> = s
      .list_review_tasks(true)
      .await
      .unwrap()
      .into_iter()
      .map(|t| t.reason)
      .collect();
    reasons.sort();
    assert_eq!(reasons, ["FETCH_FAIL_HTTP_0", "FETCH_FAIL_HTTP_200", "FETCH_FAIL_HTTP_404"]);
    assert!(s.list_evidence(None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn inactive_entities_are_skipped() {
    let s = store().await;
    s.upsert_source(SourceRule::any_domain("Company_Site")).await.unwrap();
    let acme = seed(&s, "acme.com").await;
    s.set_entity_status(acme.entity_id, EntityStatus::Inactive).await.unwrap();
    let fetcher = ScriptedFetcher::new();

    let report = collect(&s, &fetcher, &registry(), &EvidenceConfig::default(), &context())
      .await
      .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.visited, 0);
    assert!(fetcher.requests().is_empty());
  }

  #[tokio::test]
  async fn concurrent_collection_visits_every_entity() {
    let s = store().await;
    s.upsert_source(SourceRule::any_domain("Company_Site")).await.unwrap();
    let mut fetcher = ScriptedFetcher::new();
    for i in 0..6 {
      let domain = format!("site{i}.com");
      seed(&s, &domain).await;
      fetcher = fetcher.respond(&homepage_url(&domain), 200, "$10 annual");
    }
    let config = EvidenceConfig { concurrency: 4, ..EvidenceConfig::default() };

    let report = collect(&s, &fetcher, &registry(), &config, &context()).await.unwrap();
    assert_eq!(report.fetched, 6);
    assert_eq!(s.list_evidence(None).await.unwrap().len(), 6);
  }

  #[tokio::test]
  async fn cancelled_context_stops_before_fetching() {
    let s = store().await;
    s.upsert_source(SourceRule::any_domain("Company_Site")).await.unwrap();
    seed(&s, "acme.com").await;
    let fetcher = ScriptedFetcher::new();
    let ctx = context();
    ctx.cancel.cancel();

    let err = collect(&s, &fetcher, &registry(), &EvidenceConfig::default(), &ctx)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(fetcher.requests().is_empty());
  }
}
