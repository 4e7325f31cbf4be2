//! Competitor discovery through a web search API.
//!
//! Search hits are turned into entities keyed by domain. Configuration and
//! provider problems each raise one review task and end the stage without
//! touching entities: an unknown provider, a missing key, an unparseable
//! endpoint, an HTTP failure or malformed JSON.

use certify_core::{
  entity::{NewEntity, UpsertOutcome, normalize_domain},
  review::{NewReviewTask, ReviewReason},
  store::IntelStore,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
  Error, Result, RunContext,
  config::{BING_PROVIDER, DiscoveryConfig},
  fetch::{FetchRequest, Fetcher},
  review,
};

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// What a discovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
  /// Hits returned by the provider.
  pub results:      usize,
  pub created:      usize,
  pub renamed:      usize,
  /// Hits without a usable host.
  pub skipped:      usize,
  pub review_tasks: usize,
}

// ─── Provider payload ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
  #[serde(rename = "webPages")]
  web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
  #[serde(default)]
  value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  url:  Option<String>,
}

/// Parse a search response body. A missing `webPages` section means no
/// results.
fn parse_results(body: &str) -> serde_json::Result<Vec<WebPage>> {
  let resp: SearchResponse = serde_json::from_str(body)?;
  Ok(resp.web_pages.map(|p| p.value).unwrap_or_default())
}

/// Normalised host of `url`, or `None` if it has none.
pub fn domain_of(url: &str) -> Option<String> {
  let parsed = Url::parse(url.trim()).ok()?;
  let domain = normalize_domain(parsed.host_str()?);
  (!domain.is_empty()).then_some(domain)
}

// ─── Stage ───────────────────────────────────────────────────────────────────

pub async fn discover<S, F>(
  store: &S,
  fetcher: &F,
  config: &DiscoveryConfig,
  ctx: &RunContext,
) -> Result<DiscoveryReport>
where
  S: IntelStore,
  F: Fetcher,
{
  let mut report = DiscoveryReport::default();

  if !config.provider.trim().eq_ignore_ascii_case(BING_PROVIDER) {
    let reason = ReviewReason::UnknownProvider(config.provider.trim().to_owned());
    review::raise(store, NewReviewTask::new(&reason)).await?;
    report.review_tasks += 1;
    return Ok(report);
  }

  let Some(api_key) = config.api_key() else {
    review::raise(store, NewReviewTask::new(&ReviewReason::MissingApiKey)).await?;
    report.review_tasks += 1;
    return Ok(report);
  };

  let count = config.result_count.to_string();
  let url = match Url::parse_with_params(
    &config.endpoint,
    [("q", config.query()), ("count", count.as_str())],
  ) {
    Ok(url) => url,
    Err(e) => {
      tracing::debug!(endpoint = %config.endpoint, error = %e, "search endpoint does not parse");
      let task = NewReviewTask::new(&ReviewReason::InvalidEndpoint).url(config.endpoint.as_str());
      review::raise(store, task).await?;
      report.review_tasks += 1;
      return Ok(report);
    }
  };

  tracing::info!(provider = BING_PROVIDER, query = config.query(), "searching");
  let request = FetchRequest::get(url.as_str(), config.timeout())
    .header(SUBSCRIPTION_KEY_HEADER, api_key);
  let response = ctx.race(fetcher.get(request)).await?;

  if !response.is_ok() {
    let reason = ReviewReason::DiscoveryFailHttp(response.status);
    review::raise(store, NewReviewTask::new(&reason).url(config.endpoint.as_str())).await?;
    report.review_tasks += 1;
    return Ok(report);
  }

  let pages = match parse_results(&response.body) {
    Ok(pages) => pages,
    Err(e) => {
      tracing::debug!(error = %e, "search response is not valid JSON");
      let task = NewReviewTask::new(&ReviewReason::JsonParseFailed).url(config.endpoint.as_str());
      review::raise(store, task).await?;
      report.review_tasks += 1;
      return Ok(report);
    }
  };
  report.results = pages.len();

  for page in pages {
    ctx.checkpoint()?;

    let Some(domain) = page.url.as_deref().and_then(domain_of) else {
      tracing::debug!(name = ?page.name, "search hit without a host, skipping");
      report.skipped += 1;
      continue;
    };

    let name = match page.name.as_deref().map(str::trim) {
      None | Some("") => domain.clone(),
      Some(name) => name.to_owned(),
    };
    let mut input = NewEntity::new(name, &domain, format!("search:{BING_PROVIDER}"));
    input.vertical = config.vertical.clone();
    input.region = config.region.clone();
    input.segment_id = config.segment_id.clone();

    let (entity, outcome) = store.upsert_entity(input).await.map_err(Error::store)?;
    tracing::debug!(entity_id = %entity.entity_id, domain = %entity.domain, ?outcome, "entity upserted");
    match outcome {
      UpsertOutcome::Created => report.created += 1,
      UpsertOutcome::Renamed => report.renamed += 1,
    }
  }

  tracing::info!(
    results = report.results,
    created = report.created,
    renamed = report.renamed,
    "discovery finished"
  );
  Ok(report)
}
