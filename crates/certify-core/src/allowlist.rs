//! Source allowlist: the policy table gating which domains may be fetched.
//!
//! [`check`] is a pure lookup over a single [`SourceRule`]; callers fetch the
//! row from the store and pass it in (or `None` when no row exists).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Trust tier assigned to a source when its row does not name one.
pub const DEFAULT_TIER: &str = "TIER1";

fn default_tier() -> String { DEFAULT_TIER.to_owned() }

/// One row of the allowlist table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRule {
  pub source_key: String,
  pub enabled:    bool,
  /// The only domain this source may fetch from. Empty or absent means any.
  #[serde(default)]
  pub domain:     Option<String>,
  /// Trust tier propagated to evidence, candidates and claim versions.
  #[serde(default = "default_tier")]
  pub tier:       String,
}

impl SourceRule {
  /// An enabled rule for `source_key` that accepts any domain.
  pub fn any_domain(source_key: impl Into<String>) -> Self {
    Self {
      source_key: source_key.into(),
      enabled:    true,
      domain:     None,
      tier:       default_tier(),
    }
  }

  /// An enabled rule that only admits `domain`.
  pub fn for_domain(source_key: impl Into<String>, domain: impl Into<String>) -> Self {
    Self { domain: Some(domain.into()), ..Self::any_domain(source_key) }
  }

  /// The configured domain, lowercased, or `None` when the rule is open.
  pub fn restricted_domain(&self) -> Option<String> {
    self
      .domain
      .as_deref()
      .map(str::trim)
      .filter(|d| !d.is_empty())
      .map(str::to_ascii_lowercase)
  }
}

/// Outcome of an allowlist check. Only [`AllowlistDecision::Ok`] permits a
/// fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowlistDecision {
  Ok,
  SourceNotFound,
  SourceDisabled,
  DomainNotAllowed,
}

impl AllowlistDecision {
  pub fn is_ok(self) -> bool { matches!(self, Self::Ok) }

  /// The reason code carried into review tasks.
  pub fn code(self) -> &'static str {
    match self {
      Self::Ok => "OK",
      Self::SourceNotFound => "SOURCE_NOT_FOUND",
      Self::SourceDisabled => "SOURCE_DISABLED",
      Self::DomainNotAllowed => "DOMAIN_NOT_ALLOWED",
    }
  }
}

impl fmt::Display for AllowlistDecision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

/// Decide whether `domain` may be fetched under `rule`.
///
/// Rules are applied in order: missing row, disabled source, domain mismatch.
/// Domain comparison is case-insensitive.
pub fn check(rule: Option<&SourceRule>, domain: &str) -> AllowlistDecision {
  let Some(rule) = rule else {
    return AllowlistDecision::SourceNotFound;
  };
  if !rule.enabled {
    return AllowlistDecision::SourceDisabled;
  }
  match rule.restricted_domain() {
    Some(allowed) if allowed != domain.trim().to_ascii_lowercase() => {
      AllowlistDecision::DomainNotAllowed
    }
    _ => AllowlistDecision::Ok,
  }
}
