//! Pluggable field extractors.
//!
//! An [`Extractor`] reads one field out of a fetched body. Every extractor in
//! the [`ExtractorRegistry`] runs against every evidence row and always
//! yields exactly one candidate: either a finding or an `UNKNOWN`
//! placeholder paired with a review task.

use std::{fmt, ops::Range};

use certify_core::{
  claim::{NewCandidate, StatusAuto, StatusFinal, UNKNOWN_VALUE},
  entity::Entity,
  evidence::Evidence,
  review::{NewReviewTask, ReviewReason},
  store::IntelStore,
};
use regex::{Regex, RegexBuilder};

use crate::{Error, Result, review};

pub const PRICING_ACV: &str = "pricing_acv";

/// Result of running one extractor over a body.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
  Found(Finding),
  /// Nothing usable; `reason` doubles as the review task code.
  Missing { confidence: f64, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
  pub value_text: String,
  pub value_num:  Option<f64>,
  pub units:      Option<String>,
  pub confidence: f64,
  /// Byte range of the match in the body.
  pub span:       Range<usize>,
  pub reason:     String,
}

pub trait Extractor: Send + Sync {
  /// The claim field this extractor fills.
  fn field_key(&self) -> &str;

  fn extract(&self, text: &str) -> Extraction;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The active extractors, at most one per field key.
#[derive(Default)]
pub struct ExtractorRegistry {
  extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
  /// A registry holding the built-in extractors.
  pub fn with_defaults() -> Result<Self> {
    let mut registry = Self::default();
    registry.register(PricingAcvExtractor::new()?);
    Ok(registry)
  }

  /// Add an extractor, replacing any existing one for the same field.
  pub fn register(&mut self, extractor: impl Extractor + 'static) {
    let boxed: Box<dyn Extractor> = Box::new(extractor);
    match self.extractors.iter_mut().find(|e| e.field_key() == boxed.field_key()) {
      Some(slot) => *slot = boxed,
      None => self.extractors.push(boxed),
    }
  }

  pub fn get(&self, field_key: &str) -> Option<&dyn Extractor> {
    self.iter().find(|e| e.field_key() == field_key)
  }

  pub fn iter(&self) -> impl Iterator<Item = &dyn Extractor> {
    self.extractors.iter().map(|e| e.as_ref())
  }

  pub fn len(&self) -> usize { self.extractors.len() }

  pub fn is_empty(&self) -> bool { self.extractors.is_empty() }
}

impl fmt::Debug for ExtractorRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.iter().map(|e| e.field_key())).finish()
  }
}

// ─── pricing_acv ─────────────────────────────────────────────────────────────

const ANNUAL_PRICE_PATTERN: &str =
  r"\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:per\s+year|/\s*year|annual)";

/// Finds an explicitly annual dollar price such as `$12,000 per year`.
/// Only the first match counts.
#[derive(Debug, Clone)]
pub struct PricingAcvExtractor {
  pattern: Regex,
}

impl PricingAcvExtractor {
  pub const FOUND_CONFIDENCE: f64 = 0.75;
  pub const MISSING_CONFIDENCE: f64 = 0.2;
  pub const FOUND_REASON: &'static str = "EXPLICIT_ANNUAL_PRICE";
  pub const MISSING_REASON: &'static str = "NO_EXPLICIT_ACV";

  pub fn new() -> Result<Self> {
    let pattern = RegexBuilder::new(ANNUAL_PRICE_PATTERN)
      .case_insensitive(true)
      .build()?;
    Ok(Self { pattern })
  }

  fn find(&self, text: &str) -> Option<Finding> {
    let caps = self.pattern.captures(text)?;
    let whole = caps.get(0)?;
    let value_text = caps.get(1)?.as_str().replace(',', "");
    Some(Finding {
      value_num: value_text.parse().ok(),
      value_text,
      units: Some("USD".to_owned()),
      confidence: Self::FOUND_CONFIDENCE,
      span: whole.range(),
      reason: Self::FOUND_REASON.to_owned(),
    })
  }
}

impl Extractor for PricingAcvExtractor {
  fn field_key(&self) -> &str { PRICING_ACV }

  fn extract(&self, text: &str) -> Extraction {
    match self.find(text) {
      Some(finding) => Extraction::Found(finding),
      None => Extraction::Missing {
        confidence: Self::MISSING_CONFIDENCE,
        reason:     Self::MISSING_REASON.to_owned(),
      },
    }
  }
}

// ─── Candidate construction ──────────────────────────────────────────────────

/// Candidate for `field_key` read from `evidence`. The final status follows
/// from the auto status and confidence when the store writes it.
pub fn candidate(
  extraction: &Extraction,
  field_key: &str,
  entity: &Entity,
  evidence: &Evidence,
) -> NewCandidate {
  let base = NewCandidate {
    entity_id:   entity.entity_id,
    segment_id:  entity.segment_id.clone(),
    field_key:   field_key.to_owned(),
    value_text:  UNKNOWN_VALUE.to_owned(),
    value_num:   None,
    units:       None,
    confidence:  0.0,
    evidence_id: Some(evidence.evidence_id),
    span_start:  None,
    span_end:    None,
    tier:        evidence.tier.clone(),
    status_auto: StatusAuto::ReviewRequired,
    auto_reason: String::new(),
  };

  match extraction {
    Extraction::Found(f) => NewCandidate {
      value_text: f.value_text.clone(),
      value_num: f.value_num,
      units: f.units.clone(),
      confidence: f.confidence,
      span_start: Some(f.span.start),
      span_end: Some(f.span.end),
      status_auto: StatusAuto::Promotable,
      auto_reason: f.reason.clone(),
      ..base
    },
    Extraction::Missing { confidence, reason } => NewCandidate {
      confidence: *confidence,
      auto_reason: reason.clone(),
      ..base
    },
  }
}

/// Counts from running the registry over one evidence row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionTally {
  pub candidates:   usize,
  pub promoted:     usize,
  pub review_tasks: usize,
}

/// Run every registered extractor over `body` and persist one candidate per
/// extractor. Missing values also raise a review task.
pub async fn record_candidates<S: IntelStore>(
  store: &S,
  registry: &ExtractorRegistry,
  entity: &Entity,
  evidence: &Evidence,
  body: &str,
) -> Result<ExtractionTally> {
  let mut tally = ExtractionTally::default();

  for extractor in registry.iter() {
    let field_key = extractor.field_key();
    let extraction = extractor.extract(body);
    let input = candidate(&extraction, field_key, entity, evidence);
    let stored = store.record_candidate(input).await.map_err(Error::store)?;
    tracing::debug!(
      entity_id = %entity.entity_id,
      field_key,
      value = %stored.value_text,
      status = %stored.status_final,
      "candidate recorded"
    );
    tally.candidates += 1;
    if stored.status_final == StatusFinal::Promoted {
      tally.promoted += 1;
    }

    if let Extraction::Missing { reason, .. } = &extraction {
      let task = NewReviewTask::new(&ReviewReason::Extraction(reason.clone()))
        .entity(entity.entity_id)
        .field(field_key)
        .evidence(evidence.evidence_id)
        .url(evidence.url.as_str());
      review::raise(store, task).await?;
      tally.review_tasks += 1;
    }
  }

  Ok(tally)
}
