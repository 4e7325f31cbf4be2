//! Pipeline configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable configuration. The CLI layers a TOML file and `CERTIFY_*`
//! environment variables (e.g. `CERTIFY_DISCOVERY__API_KEY`) on top with the
//! `config` crate.

use std::{path::PathBuf, time::Duration};

use certify_core::{allowlist::SourceRule, event::AlertRule};
use serde::{Deserialize, Serialize};

pub const BING_PROVIDER: &str = "bing";
pub const BING_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
pub const DEFAULT_QUERY: &str = "healthcare provider credentialing software competitors";
pub const COMPANY_SITE: &str = "Company_Site";
pub const DEFAULT_CREATED_BY: &str = "certify-pipeline";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Path to the SQLite database; a leading `~/` is expanded by the CLI.
  pub store_path:  PathBuf,
  pub discovery:   DiscoveryConfig,
  pub evidence:    EvidenceConfig,
  pub promotion:   PromotionConfig,
  /// Allowlist rows upserted before each run.
  pub sources:     Vec<SourceRule>,
  /// Alert rules upserted before each run.
  pub alert_rules: Vec<AlertRule>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      store_path:  PathBuf::from("certify.db"),
      discovery:   DiscoveryConfig::default(),
      evidence:    EvidenceConfig::default(),
      promotion:   PromotionConfig::default(),
      sources:     Vec::new(),
      alert_rules: Vec::new(),
    }
  }
}

// ─── Discovery ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
  pub provider:     String,
  pub api_key:      Option<String>,
  /// Falls back to [`DEFAULT_QUERY`] when unset or blank.
  pub query:        Option<String>,
  pub endpoint:     String,
  pub result_count: u32,
  pub timeout_ms:   u64,
  /// Applied to newly created entities only.
  pub vertical:     Option<String>,
  pub region:       Option<String>,
  pub segment_id:   Option<String>,
}

impl DiscoveryConfig {
  pub fn query(&self) -> &str {
    self
      .query
      .as_deref()
      .map(str::trim)
      .filter(|q| !q.is_empty())
      .unwrap_or(DEFAULT_QUERY)
  }

  /// The API key, if one is configured and non-blank.
  pub fn api_key(&self) -> Option<&str> {
    self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
  }

  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl Default for DiscoveryConfig {
  fn default() -> Self {
    Self {
      provider:     BING_PROVIDER.to_owned(),
      api_key:      None,
      query:        None,
      endpoint:     BING_ENDPOINT.to_owned(),
      result_count: 20,
      timeout_ms:   15_000,
      vertical:     None,
      region:       None,
      segment_id:   None,
    }
  }
}

// ─── Evidence ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
  /// Allowlist row consulted before every fetch.
  pub source_key:  String,
  pub timeout_ms:  u64,
  pub snippet_len: usize,
  /// Entities fetched at once. `1` is strictly sequential.
  pub concurrency: usize,
  pub user_agent:  String,
}

impl EvidenceConfig {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl Default for EvidenceConfig {
  fn default() -> Self {
    Self {
      source_key:  COMPANY_SITE.to_owned(),
      timeout_ms:  15_000,
      snippet_len: 500,
      concurrency: 1,
      user_agent:  concat!("certify-intel/", env!("CARGO_PKG_VERSION")).to_owned(),
    }
  }
}

// ─── Promotion ───────────────────────────────────────────────────────────────

/// What to do when a promoted candidate repeats an existing claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
  /// Every promotion mints a fresh claim.
  #[default]
  AlwaysMint,
  /// Skip when the latest version already holds the same value.
  SkipUnchanged,
  /// Skip when unchanged, otherwise add a version to the existing claim.
  Chain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
  pub policy:     PromotionPolicy,
  pub created_by: String,
}

impl Default for PromotionConfig {
  fn default() -> Self {
    Self {
      policy:     PromotionPolicy::default(),
      created_by: DEFAULT_CREATED_BY.to_owned(),
    }
  }
}
