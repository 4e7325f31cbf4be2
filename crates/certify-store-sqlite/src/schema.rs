//! SQL schema for the Certify Intel SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Every append-only table carries a `seq` column; reads order by it so that
/// "storage order" survives identical timestamps.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Allowlist. An empty or NULL domain accepts any domain.
CREATE TABLE IF NOT EXISTS sources (
    source_key  TEXT PRIMARY KEY,
    enabled     INTEGER NOT NULL,
    domain      TEXT,
    tier        TEXT NOT NULL DEFAULT 'TIER1'
);

-- Upserted by domain; never deleted.
CREATE TABLE IF NOT EXISTS entities (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id       TEXT NOT NULL UNIQUE,
    canonical_name  TEXT NOT NULL,
    domain          TEXT NOT NULL UNIQUE,
    vertical        TEXT,
    region          TEXT,
    segment_id      TEXT,
    discovered_via  TEXT NOT NULL,
    discovered_at   TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'active'   -- 'active' | 'inactive'
);

-- Append-only from here down to the lifecycle tables.
CREATE TABLE IF NOT EXISTS evidence (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    evidence_id   TEXT NOT NULL UNIQUE,
    entity_id     TEXT NOT NULL REFERENCES entities(entity_id),
    source_key    TEXT NOT NULL,
    tier          TEXT NOT NULL,
    url           TEXT NOT NULL,
    fetched_at    TEXT NOT NULL,
    snippet       TEXT NOT NULL,
    text_hash     TEXT NOT NULL,
    domain_calc   TEXT NOT NULL,
    allowlist_ok  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id     TEXT NOT NULL UNIQUE,
    url             TEXT NOT NULL,
    domain          TEXT NOT NULL,
    source_key      TEXT NOT NULL,
    entity_id       TEXT REFERENCES entities(entity_id),
    fetched_at_utc  TEXT NOT NULL,
    http_status     INTEGER NOT NULL,
    text_hash       TEXT NOT NULL,
    text_len        INTEGER NOT NULL,
    notes           TEXT
);

CREATE TABLE IF NOT EXISTS candidates (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id  TEXT NOT NULL UNIQUE,
    entity_id     TEXT NOT NULL REFERENCES entities(entity_id),
    segment_id    TEXT,
    field_key     TEXT NOT NULL,
    value_text    TEXT NOT NULL,
    value_num     REAL,
    units         TEXT,
    confidence    REAL NOT NULL,
    evidence_id   TEXT REFERENCES evidence(evidence_id),
    span_start    INTEGER,
    span_end      INTEGER,
    tier          TEXT NOT NULL,
    status_auto   TEXT NOT NULL,   -- 'PROMOTABLE' | 'REVIEW_REQUIRED'
    auto_reason   TEXT NOT NULL,
    status_final  TEXT NOT NULL,   -- 'PROMOTED' | 'REVIEW_REQUIRED'
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS claim_versions (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    version_id      TEXT NOT NULL UNIQUE,
    claim_id        TEXT NOT NULL,
    entity_id       TEXT NOT NULL REFERENCES entities(entity_id),
    field_key       TEXT NOT NULL,
    value_type      TEXT NOT NULL,   -- 'number' | 'text'
    value_num       REAL,
    value_text      TEXT NOT NULL,
    confidence      REAL NOT NULL,
    tier            TEXT NOT NULL,
    evidence_id     TEXT NOT NULL REFERENCES evidence(evidence_id),
    created_at_utc  TEXT NOT NULL,
    created_by      TEXT NOT NULL,
    reason          TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS events (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id         TEXT NOT NULL UNIQUE,
    event_type       TEXT NOT NULL,
    severity         TEXT NOT NULL,
    url              TEXT NOT NULL,
    detected_at_utc  TEXT NOT NULL,
    prev_text_hash   TEXT NOT NULL,
    new_text_hash    TEXT NOT NULL,
    summary          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_tasks (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id      TEXT NOT NULL UNIQUE,
    created_at   TEXT NOT NULL,
    entity_id    TEXT REFERENCES entities(entity_id),
    field_key    TEXT,
    severity     TEXT NOT NULL,
    reason       TEXT NOT NULL,
    evidence_id  TEXT REFERENCES evidence(evidence_id),
    url          TEXT
);

CREATE TABLE IF NOT EXISTS runs (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id          TEXT NOT NULL UNIQUE,
    started_at_utc  TEXT NOT NULL,
    mode            TEXT NOT NULL
);

-- Lifecycle records: at most one per parent row.
CREATE TABLE IF NOT EXISTS event_acknowledgements (
    acknowledgement_id  TEXT PRIMARY KEY,
    event_id            TEXT NOT NULL REFERENCES events(event_id),
    note                TEXT,
    recorded_at         TEXT NOT NULL,
    UNIQUE (event_id)
);

CREATE TABLE IF NOT EXISTS review_resolutions (
    resolution_id  TEXT PRIMARY KEY,
    task_id        TEXT NOT NULL REFERENCES review_tasks(task_id),
    note           TEXT,
    recorded_at    TEXT NOT NULL,
    UNIQUE (task_id)
);

CREATE TABLE IF NOT EXISTS run_outcomes (
    run_id           TEXT PRIMARY KEY REFERENCES runs(run_id),
    status           TEXT NOT NULL CHECK (status IN ('completed', 'failed')),
    notes            TEXT,
    finished_at_utc  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_rules (
    rule_key           TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    enabled            INTEGER NOT NULL,
    last_fired_at_utc  TEXT
);

-- Dependent view; rebuilt wholesale by refresh_views.
CREATE TABLE IF NOT EXISTS entity_summaries (
    entity_id            TEXT PRIMARY KEY,
    canonical_name       TEXT NOT NULL,
    domain               TEXT NOT NULL,
    status               TEXT NOT NULL,
    evidence_count       INTEGER NOT NULL,
    claim_version_count  INTEGER NOT NULL,
    open_review_count    INTEGER NOT NULL,
    last_evidence_at     TEXT,
    refreshed_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS evidence_entity_idx   ON evidence(entity_id);
CREATE INDEX IF NOT EXISTS snapshots_url_idx     ON snapshots(url);
CREATE INDEX IF NOT EXISTS claims_entity_key_idx ON claim_versions(entity_id, field_key);
CREATE INDEX IF NOT EXISTS events_type_idx       ON events(event_type);
CREATE INDEX IF NOT EXISTS review_entity_idx     ON review_tasks(entity_id);

PRAGMA user_version = 1;
";
