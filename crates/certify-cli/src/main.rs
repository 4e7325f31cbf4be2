//! `certify`: operator CLI for the Certify Intel evidence pipeline.
//!
//! # Usage
//!
//! ```
//! certify run --mode full
//! certify review --open
//! certify ack-event 3f2c… --note "pricing page redesign"
//! ```
//!
//! Configuration comes from `certify.toml` (or `--config`), overridden by
//! `CERTIFY_*` environment variables with `__` between nesting levels, e.g.
//! `CERTIFY_DISCOVERY__API_KEY`. Every command prints JSON on stdout; logs go
//! to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use certify_core::{entity::EntityStatus, run::RunMode, store::IntelStore};
use certify_pipeline::{Pipeline, PipelineConfig, fetch::HttpFetcher};
use certify_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "certify", author, version, about = "Certify Intel evidence pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "certify.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the pipeline once and print the run summary.
  Run {
    /// `full` searches for new competitors first; `refresh` does not.
    #[arg(long, default_value = "full")]
    mode: RunMode,
  },
  /// List tracked entities.
  Entities,
  /// List allowlist rows.
  Sources,
  /// List claim versions.
  Claims {
    #[arg(long, value_name = "ENTITY_ID")]
    entity: Option<Uuid>,
  },
  /// List change events.
  Events {
    /// Only events that have not been acknowledged.
    #[arg(long)]
    open: bool,
  },
  /// List review tasks.
  Review {
    /// Only tasks that have not been resolved.
    #[arg(long)]
    open: bool,
  },
  /// List runs, most recent first.
  Runs,
  /// List per-entity summaries as of the last run.
  Summaries,
  /// Acknowledge a change event.
  AckEvent {
    event_id: Uuid,
    #[arg(long)]
    note:     Option<String>,
  },
  /// Resolve a review task.
  ResolveTask {
    task_id: Uuid,
    #[arg(long)]
    note:    Option<String>,
  },
  /// Mark an entity active or inactive.
  SetStatus {
    entity_id: Uuid,
    /// `active` or `inactive`.
    status:    EntityStatus,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let config = load_config(&cli.config)?;

  let store_path = expand_tilde(&config.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Run { mode } => run(store, config, mode).await,
    Command::Entities => print_json(&store.list_entities().await?),
    Command::Sources => print_json(&store.list_sources().await?),
    Command::Claims { entity } => print_json(&store.list_claim_versions(entity).await?),
    Command::Events { open } => print_json(&store.list_events(open).await?),
    Command::Review { open } => print_json(&store.list_review_tasks(open).await?),
    Command::Runs => print_json(&store.list_runs().await?),
    Command::Summaries => print_json(&store.list_entity_summaries().await?),
    Command::AckEvent { event_id, note } => {
      let ack = store
        .acknowledge_event(event_id, note)
        .await
        .with_context(|| format!("failed to acknowledge event {event_id}"))?;
      print_json(&ack)
    }
    Command::ResolveTask { task_id, note } => {
      let resolution = store
        .resolve_review_task(task_id, note)
        .await
        .with_context(|| format!("failed to resolve review task {task_id}"))?;
      print_json(&resolution)
    }
    Command::SetStatus { entity_id, status } => {
      let entity = store
        .set_entity_status(entity_id, status)
        .await
        .with_context(|| format!("failed to update entity {entity_id}"))?;
      print_json(&entity)
    }
  }
}

async fn run(store: SqliteStore, config: PipelineConfig, mode: RunMode) -> Result<()> {
  let fetcher = HttpFetcher::new(&config.evidence.user_agent, config.evidence.timeout())
    .context("failed to build HTTP client")?;
  let mut pipeline = Pipeline::new(store, fetcher, config).context("failed to build pipeline")?;

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupt received, cancelling run");
      on_interrupt.cancel();
    }
  });

  let summary = pipeline.run(mode, cancel).await.context("run log unavailable")?;
  print_json(&summary)?;

  if !summary.succeeded() {
    bail!(
      "run {} failed: {}",
      summary.run.run_id,
      summary.run.notes.as_deref().unwrap_or("no details")
    );
  }
  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// `CERTIFY_DISCOVERY__API_KEY` sets `discovery.api_key`.
fn env_source() -> config::Environment {
  config::Environment::with_prefix("CERTIFY")
    .prefix_separator("_")
    .separator("__")
}

fn load_config(path: &Path) -> Result<PipelineConfig> { load_config_with(path, env_source()) }

fn load_config_with(path: &Path, env: config::Environment) -> Result<PipelineConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(env)
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise PipelineConfig")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let out = serde_json::to_string_pretty(value).context("failed to serialise output")?;
  println!("{out}");
  Ok(())
}

/// Expand a leading `~/` to the value of `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn expand_tilde_uses_home() {
    let home = std::env::var("HOME").unwrap_or_default();
    if home.is_empty() {
      return;
    }
    assert_eq!(expand_tilde(Path::new("~/intel.db")), PathBuf::from(&home).join("intel.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/intel.db")), PathBuf::from("/tmp/intel.db"));
  }

  #[test]
  fn parses_subcommands() {
    let cli = Cli::try_parse_from(["certify", "run", "--mode", "refresh"]).unwrap();
    assert!(matches!(cli.command, Command::Run { mode: RunMode::Refresh }));
    assert_eq!(cli.config, PathBuf::from("certify.toml"));

    let id = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from(["certify", "set-status", &id, "inactive"]).unwrap();
    assert!(matches!(cli.command, Command::SetStatus { status: EntityStatus::Inactive, .. }));

    assert!(Cli::try_parse_from(["certify", "run", "--mode", "weekly"]).is_err());
  }

  #[test]
  fn missing_config_file_yields_defaults() {
    let cfg = load_config(Path::new("/nonexistent/certify.toml")).unwrap();
    assert_eq!(cfg.evidence.source_key, "Company_Site");
    assert_eq!(cfg.store_path, PathBuf::from("certify.db"));
  }

  #[test]
  fn environment_overrides_nested_keys() {
    let vars = [
      ("CERTIFY_DISCOVERY__API_KEY", "from-env"),
      ("CERTIFY_EVIDENCE__SOURCE_KEY", "Env_Source"),
      ("OTHER_DISCOVERY__API_KEY", "ignored"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();

    let env = env_source().source(Some(vars));
    let cfg = load_config_with(Path::new("/nonexistent/certify.toml"), env).unwrap();
    assert_eq!(cfg.discovery.api_key(), Some("from-env"));
    assert_eq!(cfg.evidence.source_key, "Env_Source");
    assert_eq!(cfg.discovery.provider, "bing");
  }
}
