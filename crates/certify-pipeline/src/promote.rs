//! Claim promotion.
//!
//! Promoted candidates with a known value and an evidence reference become
//! claim versions. [`PromotionPolicy`] decides what happens when a candidate
//! repeats a value the claim table already holds. Under the deduplicating
//! policies only the newest eligible candidate per (entity, field) is looked
//! at, so an old reading can never overwrite a newer one.

use std::collections::HashMap;

use certify_core::{
  claim::{ClaimCandidate, NewClaimVersion, StatusFinal},
  store::IntelStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result, RunContext,
  config::{PromotionConfig, PromotionPolicy},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
  pub considered:         usize,
  pub promoted:           usize,
  /// Candidates whose final status is not `PROMOTED`.
  pub skipped_status:     usize,
  /// `UNKNOWN` values and candidates without evidence.
  pub skipped_unknown:    usize,
  pub skipped_unchanged:  usize,
  /// Older candidates hidden by a newer one for the same field.
  pub skipped_superseded: usize,
}

enum Decision {
  Skip,
  Mint { claim_id: Option<Uuid> },
}

async fn decide<S: IntelStore>(
  store: &S,
  policy: PromotionPolicy,
  candidate: &ClaimCandidate,
) -> Result<Decision> {
  if policy == PromotionPolicy::AlwaysMint {
    return Ok(Decision::Mint { claim_id: None });
  }

  let latest = store
    .latest_claim_version(candidate.entity_id, &candidate.field_key)
    .await
    .map_err(Error::store)?;

  Ok(match latest {
    Some(v) if v.same_value_as(candidate) => Decision::Skip,
    Some(v) if policy == PromotionPolicy::Chain => Decision::Mint { claim_id: Some(v.claim_id) },
    _ => Decision::Mint { claim_id: None },
  })
}

/// Keep the last candidate of each (entity, field) pair, in storage order.
fn latest_per_field(candidates: Vec<&ClaimCandidate>) -> Vec<&ClaimCandidate> {
  let mut last: HashMap<(Uuid, &str), usize> = HashMap::new();
  for (i, c) in candidates.iter().enumerate() {
    last.insert((c.entity_id, c.field_key.as_str()), i);
  }
  candidates
    .iter()
    .enumerate()
    .filter(|(i, c)| last.get(&(c.entity_id, c.field_key.as_str())) == Some(i))
    .map(|(_, c)| *c)
    .collect()
}

pub async fn promote<S: IntelStore>(
  store: &S,
  config: &PromotionConfig,
  ctx: &RunContext,
) -> Result<PromotionReport> {
  let candidates = store.list_candidates().await.map_err(Error::store)?;
  let mut report = PromotionReport::default();
  tracing::info!(candidates = candidates.len(), policy = ?config.policy, "promoting candidates");

  let mut eligible = Vec::new();
  for candidate in &candidates {
    report.considered += 1;
    if candidate.status_final != StatusFinal::Promoted {
      report.skipped_status += 1;
    } else if candidate.evidence_id.is_none() || !candidate.has_known_value() {
      report.skipped_unknown += 1;
    } else {
      eligible.push(candidate);
    }
  }

  if config.policy != PromotionPolicy::AlwaysMint {
    let before = eligible.len();
    eligible = latest_per_field(eligible);
    report.skipped_superseded = before - eligible.len();
  }

  for candidate in eligible {
    ctx.checkpoint()?;

    let claim_id = match decide(store, config.policy, candidate).await? {
      Decision::Skip => {
        report.skipped_unchanged += 1;
        continue;
      }
      Decision::Mint { claim_id } => claim_id,
    };

    let Some(input) = NewClaimVersion::from_candidate(candidate, &config.created_by, claim_id)
    else {
      report.skipped_unknown += 1;
      continue;
    };
    let version = store.record_claim_version(input).await.map_err(Error::store)?;
    tracing::debug!(
      entity_id = %version.entity_id,
      field_key = %version.field_key,
      claim_id = %version.claim_id,
      value = %version.value_text,
      "claim version minted"
    );
    report.promoted += 1;
  }

  tracing::info!(
    promoted = report.promoted,
    skipped_unchanged = report.skipped_unchanged,
    "promotion finished"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use certify_core::{
    claim::{NewCandidate, StatusAuto, UNKNOWN_VALUE},
    entity::NewEntity,
    evidence::NewEvidence,
  };
  use certify_store_sqlite::SqliteStore;

  use super::*;
  use crate::testing::{context, store};

  struct Fixture {
    store:     SqliteStore,
    entity_id: Uuid,
  }

  impl Fixture {
    async fn new() -> Self {
      let store = store().await;
      let (e, _) = store
        .upsert_entity(NewEntity::new("Acme", "acme.com", "manual"))
        .await
        .unwrap();
      Self { store, entity_id: e.entity_id }
    }

    async fn evidence(&self) -> Uuid {
      let ev = self
        .store
        .record_evidence(NewEvidence {
          entity_id:    self.entity_id,
          source_key:   "Company_Site".into(),
          tier:         "TIER1".into(),
          url:          "https://acme.com/".into(),
          snippet:      String::new(),
          text_hash:    "h".into(),
          domain_calc:  "acme.com".into(),
          allowlist_ok: true,
        })
        .await
        .unwrap();
      ev.evidence_id
    }

    async fn candidate(&self, value: &str, auto: StatusAuto, confidence: f64, evidence: bool) {
      let evidence_id = if evidence { Some(self.evidence().await) } else { None };
      self
        .store
        .record_candidate(NewCandidate {
          entity_id: self.entity_id,
          segment_id: None,
          field_key: "pricing_acv".into(),
          value_text: value.into(),
          value_num: value.parse().ok(),
          units: Some("USD".into()),
          confidence,
          evidence_id,
          span_start: None,
          span_end: None,
          tier: "TIER1".into(),
          status_auto: auto,
          auto_reason: "TEST".into(),
        })
        .await
        .unwrap();
    }

    async fn promote(&self, policy: PromotionPolicy) -> PromotionReport {
      let config = PromotionConfig { policy, ..PromotionConfig::default() };
      promote(&self.store, &config, &context()).await.unwrap()
    }
  }

  #[tokio::test]
  async fn promoted_candidate_becomes_claim_version() {
    let f = Fixture::new().await;
    f.candidate("12000", StatusAuto::Promotable, 0.75, true).await;

    let report = f.promote(PromotionPolicy::AlwaysMint).await;
    assert_eq!(report.promoted, 1);

    let versions = f.store.list_claim_versions(None).await.unwrap();
    assert_eq!(versions.len(), 1);
    let v = &versions[0];
    assert_eq!(v.value_num, Some(12000.0));
    assert_eq!(v.created_by, "certify-pipeline");
    assert_eq!(v.status, "active");
    assert!(v.reason.starts_with("promoted from candidate "));
  }

  #[tokio::test]
  async fn never_mints_from_unknown_or_unpromoted() {
    let f = Fixture::new().await;
    f.candidate(UNKNOWN_VALUE, StatusAuto::Promotable, 0.9, true).await;
    f.candidate("5", StatusAuto::Promotable, 0.9, false).await;
    f.candidate("5", StatusAuto::Promotable, 0.5, true).await;
    f.candidate("5", StatusAuto::ReviewRequired, 0.9, true).await;

    let report = f.promote(PromotionPolicy::AlwaysMint).await;
    assert_eq!(report.considered, 4);
    assert_eq!(report.promoted, 0);
    assert_eq!(report.skipped_unknown, 2);
    assert_eq!(report.skipped_status, 2);
    assert!(f.store.list_claim_versions(None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn always_mint_repeats_every_run() {
    let f = Fixture::new().await;
    f.candidate("100", StatusAuto::Promotable, 0.75, true).await;

    f.promote(PromotionPolicy::AlwaysMint).await;
    f.promote(PromotionPolicy::AlwaysMint).await;

    let versions = f.store.list_claim_versions(None).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_ne!(versions[0].claim_id, versions[1].claim_id);
  }

  #[tokio::test]
  async fn skip_unchanged_mints_once_per_value() {
    let f = Fixture::new().await;
    f.candidate("100", StatusAuto::Promotable, 0.75, true).await;
    assert_eq!(f.promote(PromotionPolicy::SkipUnchanged).await.promoted, 1);

    // Same value re-read from fresh evidence.
    f.candidate("100", StatusAuto::Promotable, 0.75, true).await;
    let report = f.promote(PromotionPolicy::SkipUnchanged).await;
    assert_eq!(report.promoted, 0);
    assert_eq!(report.skipped_superseded, 1);
    assert_eq!(report.skipped_unchanged, 1);

    f.candidate("200", StatusAuto::Promotable, 0.75, true).await;
    f.promote(PromotionPolicy::SkipUnchanged).await;

    let versions = f.store.list_claim_versions(None).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_ne!(versions[0].claim_id, versions[1].claim_id);
  }

  #[tokio::test]
  async fn chain_keeps_claim_id_across_values() {
    let f = Fixture::new().await;
    f.candidate("100", StatusAuto::Promotable, 0.75, true).await;
    f.promote(PromotionPolicy::Chain).await;
    f.candidate("200", StatusAuto::Promotable, 0.75, true).await;
    f.promote(PromotionPolicy::Chain).await;

    let versions = f.store.list_claim_versions(None).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].claim_id, versions[1].claim_id);
    assert_ne!(versions[0].version_id, versions[1].version_id);
  }

  #[tokio::test]
  async fn older_readings_never_overwrite_newer_claims() {
    let f = Fixture::new().await;
    f.candidate("100", StatusAuto::Promotable, 0.75, true).await;
    f.promote(PromotionPolicy::Chain).await;
    f.candidate("150", StatusAuto::Promotable, 0.75, true).await;
    f.promote(PromotionPolicy::Chain).await;

    let report = f.promote(PromotionPolicy::Chain).await;
    assert_eq!(report.promoted, 0);

    let latest = f
      .store
      .latest_claim_version(f.entity_id, "pricing_acv")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(latest.value_text, "150");
  }
}
