//! Alert rule evaluation.
//!
//! A rule fires by stamping its `last_fired_at_utc`. Unknown and disabled
//! rules are left alone.

use certify_core::{
  event::{EVIDENCE_CHANGED_ANY, EventType},
  store::IntelStore,
};
use chrono::Utc;
use serde::Serialize;

use crate::{Error, Result, RunContext};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertReport {
  pub evaluated: usize,
  /// Keys of the rules that fired, in rule order.
  pub fired:     Vec<String>,
  /// Disabled rules and rules with no known condition.
  pub skipped:   usize,
}

pub async fn evaluate<S: IntelStore>(store: &S, ctx: &RunContext) -> Result<AlertReport> {
  let rules = store.list_alert_rules().await.map_err(Error::store)?;
  let mut report = AlertReport::default();

  for rule in rules {
    ctx.checkpoint()?;
    if !rule.enabled {
      report.skipped += 1;
      continue;
    }

    let triggered = match rule.rule_key.as_str() {
      EVIDENCE_CHANGED_ANY => {
        let open = store
          .count_open_events(EventType::EvidenceChanged)
          .await
          .map_err(Error::store)?;
        open > 0
      }
      other => {
        tracing::debug!(rule_key = other, "no condition for alert rule, skipping");
        report.skipped += 1;
        continue;
      }
    };
    report.evaluated += 1;

    if triggered {
      store
        .mark_rule_fired(&rule.rule_key, Utc::now())
        .await
        .map_err(Error::store)?;
      tracing::info!(rule_key = %rule.rule_key, name = %rule.name, "alert fired");
      report.fired.push(rule.rule_key);
    }
  }

  Ok(report)
}
