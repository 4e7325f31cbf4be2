//! Snapshot change detection.
//!
//! Only the last two snapshots of each URL matter: a URL whose content
//! changed and then changed back produces an event for the second transition
//! alone. Events are not deduplicated against earlier runs.

use std::collections::{HashMap, HashSet};

use certify_core::{
  event::{EventType, NewEvent},
  evidence::Snapshot,
  severity::Severity,
  store::IntelStore,
};
use serde::Serialize;

use crate::{Error, Result, RunContext};

/// The latest content transition of one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  pub url:            String,
  pub prev_text_hash: String,
  pub new_text_hash:  String,
}

impl Change {
  pub fn summary(&self) -> String { format!("Evidence content changed for {}", self.url) }

  fn into_event(self) -> NewEvent {
    NewEvent {
      event_type:     EventType::EvidenceChanged,
      severity:       Severity::Medium,
      summary:        self.summary(),
      url:            self.url,
      prev_text_hash: self.prev_text_hash,
      new_text_hash:  self.new_text_hash,
    }
  }
}

/// Compare each URL's last snapshot with the one before it. `snapshots` must
/// be in storage order. Changes come back in order of each URL's first
/// appearance.
pub fn detect_changes(snapshots: &[Snapshot]) -> Vec<Change> {
  let mut last: HashMap<&str, &str> = HashMap::new();
  let mut previous: HashMap<&str, &str> = HashMap::new();
  let mut urls: Vec<&str> = Vec::new();

  for snap in snapshots {
    match last.insert(snap.url.as_str(), snap.text_hash.as_str()) {
      Some(prior) => {
        previous.insert(snap.url.as_str(), prior);
      }
      None => urls.push(snap.url.as_str()),
    }
  }

  urls
    .into_iter()
    .filter_map(|url| {
      let prev = previous.get(url)?;
      let new = last.get(url)?;
      (prev != new).then(|| Change {
        url:            url.to_owned(),
        prev_text_hash: (*prev).to_owned(),
        new_text_hash:  (*new).to_owned(),
      })
    })
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
  pub snapshots: usize,
  pub urls:      usize,
  pub events:    usize,
}

/// Scan every stored snapshot and record one `EVIDENCE_CHANGED` event per
/// changed URL.
pub async fn record_changes<S: IntelStore>(store: &S, ctx: &RunContext) -> Result<DiffReport> {
  let snapshots = store.list_snapshots().await.map_err(Error::store)?;
  let changes = detect_changes(&snapshots);

  let mut report = DiffReport {
    snapshots: snapshots.len(),
    urls: snapshots
      .iter()
      .map(|s| s.url.as_str())
      .collect::<HashSet<_>>()
      .len(),
    events: 0,
  };

  for change in changes {
    ctx.checkpoint()?;
    let event = store
      .record_event(change.into_event())
      .await
      .map_err(Error::store)?;
    tracing::info!(event_id = %event.event_id, url = %event.url, "evidence changed");
    report.events += 1;
  }

  tracing::info!(snapshots = report.snapshots, events = report.events, "diff finished");
  Ok(report)
}

#[cfg(test)]
mod tests {
  use certify_core::evidence::NewSnapshot;
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::testing::{context, store};

  fn snap(url: &str, hash: &str) -> Snapshot {
    Snapshot {
      snapshot_id:    Uuid::new_v4(),
      url:            url.into(),
      domain:         "acme.com".into(),
      source_key:     "Company_Site".into(),
      entity_id:      None,
      fetched_at_utc: Utc::now(),
      http_status:    200,
      text_hash:      hash.into(),
      text_len:       1,
      notes:          None,
    }
  }

  const U: &str = "https://acme.com/";
  const V: &str = "https://beta.io/";

  #[test]
  fn changed_pair_yields_one_change() {
    let changes = detect_changes(&[snap(U, "h1"), snap(U, "h2")]);
    assert_eq!(changes, vec![Change {
      url:            U.into(),
      prev_text_hash: "h1".into(),
      new_text_hash:  "h2".into(),
    }]);
    assert_eq!(changes[0].summary(), "Evidence content changed for https://acme.com/");
  }

  #[test]
  fn unchanged_or_single_yields_nothing() {
    assert!(detect_changes(&[snap(U, "h1"), snap(U, "h1")]).is_empty());
    assert!(detect_changes(&[snap(U, "h1")]).is_empty());
    assert!(detect_changes(&[]).is_empty());
  }

  #[test]
  fn only_latest_transition_counts() {
    assert!(detect_changes(&[snap(U, "h1"), snap(U, "h2"), snap(U, "h2")]).is_empty());

    let changes = detect_changes(&[snap(U, "h1"), snap(U, "h2"), snap(U, "h1")]);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].prev_text_hash, "h2");
    assert_eq!(changes[0].new_text_hash, "h1");
  }

  #[test]
  fn urls_are_tracked_independently() {
    let changes = detect_changes(&[
      snap(U, "a"),
      snap(V, "x"),
      snap(U, "b"),
      snap(V, "x"),
    ]);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].url, U);
  }

  #[tokio::test]
  async fn stage_writes_open_medium_events() {
    let s = store().await;
    for hash in ["h1", "h2"] {
      s.record_snapshot(NewSnapshot {
        url:         U.into(),
        domain:      "acme.com".into(),
        source_key:  "Company_Site".into(),
        entity_id:   None,
        http_status: 200,
        text_hash:   hash.into(),
        text_len:    2,
        notes:       None,
      })
      .await
      .unwrap();
    }

    let report = record_changes(&s, &context()).await.unwrap();
    assert_eq!(report, DiffReport { snapshots: 2, urls: 1, events: 1 });

    let events = s.list_events(true).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::EvidenceChanged);
    assert_eq!(events[0].severity, Severity::Medium);
    assert_eq!(events[0].prev_text_hash, "h1");
    assert_eq!(events[0].new_text_hash, "h2");
    assert!(events[0].status.is_open());

    // A second scan over unchanged storage repeats the event.
    record_changes(&s, &context()).await.unwrap();
    assert_eq!(s.list_events(true).await.unwrap().len(), 2);
  }
}
