//! Side channel every stage uses to hand work to a human.

use certify_core::{
  review::{NewReviewTask, ReviewTask},
  store::IntelStore,
};

use crate::{Error, Result};

/// Log and persist a review task. A stage that raises one carries on with its
/// next item.
pub async fn raise<S: IntelStore>(store: &S, task: NewReviewTask) -> Result<ReviewTask> {
  tracing::warn!(
    reason = %task.reason,
    severity = %task.severity,
    entity_id = ?task.entity_id,
    url = task.url.as_deref().unwrap_or(""),
    "review task raised"
  );
  store.record_review_task(task).await.map_err(Error::store)
}
