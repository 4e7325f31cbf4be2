//! Entity: a tracked competitor company, keyed by domain.
//!
//! Entities are upserted by discovery and never hard-deleted; retiring one
//! flips its [`EntityStatus`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
  #[default]
  Active,
  Inactive,
}

impl EntityStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
    }
  }
}

impl fmt::Display for EntityStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for EntityStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "active" => Ok(Self::Active),
      "inactive" => Ok(Self::Inactive),
      other => Err(Error::unknown("entity status", other)),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:      Uuid,
  pub canonical_name: String,
  /// Lowercase host without a leading `www.`; unique across entities.
  pub domain:         String,
  pub vertical:       Option<String>,
  pub region:         Option<String>,
  pub segment_id:     Option<String>,
  /// The mechanism that first sighted this domain, e.g. `search:bing`.
  pub discovered_via: String,
  pub discovered_at:  DateTime<Utc>,
  pub status:         EntityStatus,
}

/// Input to [`crate::store::IntelStore::upsert_entity`].
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub canonical_name: String,
  pub domain:         String,
  pub vertical:       Option<String>,
  pub region:         Option<String>,
  pub segment_id:     Option<String>,
  pub discovered_via: String,
}

impl NewEntity {
  pub fn new(
    canonical_name: impl Into<String>,
    domain: &str,
    discovered_via: impl Into<String>,
  ) -> Self {
    Self {
      canonical_name: canonical_name.into(),
      domain:         normalize_domain(domain),
      vertical:       None,
      region:         None,
      segment_id:     None,
      discovered_via: discovered_via.into(),
    }
  }
}

/// Whether an upsert created a new entity or refreshed a known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
  Created,
  /// The domain was already known; only `canonical_name` was overwritten.
  Renamed,
}

/// Lowercase a host and strip a single leading `www.`.
pub fn normalize_domain(host: &str) -> String {
  let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
  match host.strip_prefix("www.") {
    Some(rest) if !rest.is_empty() => rest.to_owned(),
    _ => host,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_strips_www_and_case() {
    assert_eq!(normalize_domain("WWW.Example.com"), "example.com");
    assert_eq!(normalize_domain(" example.com. "), "example.com");
    assert_eq!(normalize_domain("www2.example.com"), "www2.example.com");
    assert_eq!(normalize_domain("www.www"), "www");
  }
}
