//! DDL for every table in the data model. Applied idempotently via
//! `CREATE TABLE IF NOT EXISTS`, gated by `PRAGMA user_version` so repeat
//! opens of the same file are cheap no-ops.

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id           TEXT PRIMARY KEY,
    research_topic        TEXT NOT NULL,
    research_type         TEXT NOT NULL,
    output_directory       TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'initializing',
    current_phase          INTEGER NOT NULL DEFAULT 0,
    iteration_count        INTEGER NOT NULL DEFAULT 0,
    confidence            REAL NOT NULL DEFAULT 0.0,
    is_aggregated          INTEGER NOT NULL DEFAULT 0,
    budget_exhausted       INTEGER NOT NULL DEFAULT 0,
    max_iterations         INTEGER NOT NULL,
    confidence_threshold    REAL NOT NULL,
    locked_at             TEXT,
    locked_by             TEXT,
    created_at            TEXT NOT NULL,
    completed_at           TEXT
);

CREATE TABLE IF NOT EXISTS agents (
    agent_id       TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL,
    agent_type     TEXT NOT NULL,
    agent_role     TEXT,
    focus_description TEXT,
    search_queries  TEXT NOT NULL DEFAULT '[]',
    status         TEXT NOT NULL DEFAULT 'deploying',
    output_file     TEXT,
    token_usage     INTEGER,
    error_message   TEXT,
    created_at     TEXT NOT NULL,
    completed_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_agents_session ON agents(session_id);

CREATE TABLE IF NOT EXISTS got_paths (
    path_id        TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL,
    parent_id      TEXT,
    node_type      TEXT NOT NULL,
    content        TEXT NOT NULL,
    summary        TEXT,
    quality_score   REAL NOT NULL DEFAULT 0.0,
    compression_ratio REAL NOT NULL DEFAULT 1.0,
    status         TEXT NOT NULL DEFAULT 'active',
    depth          INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_got_paths_session ON got_paths(session_id);
CREATE INDEX IF NOT EXISTS idx_got_paths_parent ON got_paths(parent_id);

CREATE TABLE IF NOT EXISTS got_operations (
    operation_id   TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL,
    operation_type  TEXT NOT NULL,
    input_nodes     TEXT NOT NULL DEFAULT '[]',
    output_nodes    TEXT NOT NULL DEFAULT '[]',
    parameters     TEXT NOT NULL DEFAULT '{}',
    created_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_got_operations_session ON got_operations(session_id);

CREATE TABLE IF NOT EXISTS facts (
    fact_id        TEXT PRIMARY KEY,
    session_id     TEXT,
    entity         TEXT NOT NULL,
    attribute      TEXT NOT NULL,
    value          TEXT NOT NULL,
    value_type      TEXT NOT NULL,
    value_numeric   REAL,
    unit           TEXT,
    source_url      TEXT,
    source_quality  TEXT,
    confidence     REAL NOT NULL DEFAULT 0.0
);
CREATE INDEX IF NOT EXISTS idx_facts_session ON facts(session_id);

CREATE TABLE IF NOT EXISTS entities (
    entity_id      TEXT PRIMARY KEY,
    session_id     TEXT,
    name           TEXT NOT NULL,
    entity_type     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_session ON entities(session_id);

CREATE TABLE IF NOT EXISTS relationships (
    relationship_id  TEXT PRIMARY KEY,
    session_id      TEXT,
    source_entity    TEXT NOT NULL,
    target_entity    TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    confidence      REAL NOT NULL DEFAULT 0.0,
    evidence        TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_relationships_session ON relationships(session_id);

CREATE TABLE IF NOT EXISTS citations (
    citation_id      TEXT PRIMARY KEY,
    session_id       TEXT,
    author           TEXT,
    title            TEXT,
    source           TEXT,
    url              TEXT,
    publication_date  TEXT,
    quality_rating    TEXT,
    is_valid         INTEGER NOT NULL DEFAULT 0,
    validation_notes  TEXT
);
CREATE INDEX IF NOT EXISTS idx_citations_session ON citations(session_id);

CREATE TABLE IF NOT EXISTS fact_conflicts (
    conflict_id  TEXT PRIMARY KEY,
    session_id   TEXT,
    fact_a       TEXT NOT NULL,
    fact_b       TEXT NOT NULL,
    conflict_type TEXT NOT NULL,
    severity     TEXT NOT NULL,
    resolved     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_fact_conflicts_session ON fact_conflicts(session_id);

CREATE TABLE IF NOT EXISTS activity_log (
    activity_id  TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL,
    phase       INTEGER NOT NULL DEFAULT 0,
    event_type   TEXT NOT NULL,
    message     TEXT NOT NULL,
    agent_id     TEXT,
    details     TEXT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_log_session ON activity_log(session_id);

CREATE TABLE IF NOT EXISTS checkpoints (
    checkpoint_id  TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL,
    phase_number    INTEGER NOT NULL,
    checkpoint_type TEXT NOT NULL,
    state_snapshot  TEXT NOT NULL,
    created_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id);

CREATE TABLE IF NOT EXISTS ingest_queue (
    ingest_id   TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL,
    payload    TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ingest_queue_session ON ingest_queue(session_id);

CREATE TABLE IF NOT EXISTS session_metrics (
    session_id      TEXT PRIMARY KEY,
    paths_generated  INTEGER NOT NULL DEFAULT 0,
    paths_pruned     INTEGER NOT NULL DEFAULT 0,
    tool_calls       INTEGER NOT NULL DEFAULT 0,
    total_tokens     INTEGER NOT NULL DEFAULT 0
);
";
