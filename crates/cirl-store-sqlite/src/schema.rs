//! SQL schema for the CIRL SQLite store.
//!
//! [`SCHEMA`] is executed once, when a database is opened without an `apps`
//! table. [`MODELS_TABLE`] was added later and is ensured on every open so
//! databases created before it gain the table.

/// Name of the table whose presence marks an initialised database.
pub const MARKER_TABLE: &str = "apps";

/// Full schema DDL.
///
/// Join tables carry a `position` column so membership lists keep the order
/// they were saved in. `hit_analyses.dataset_id` has no foreign key: it
/// holds either a dataset id or an analysis scope such as
/// `qa_library:<appId>`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS apps (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    metadata    TEXT,              -- JSON object
    created_at  TEXT NOT NULL,     -- ISO 8601 UTC, millisecond precision
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS query_records (
    id          TEXT PRIMARY KEY,
    app_id      TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    input       TEXT NOT NULL,
    output      TEXT NOT NULL,
    model_id    TEXT,
    context     TEXT,              -- JSON object
    curated     INTEGER,           -- 0 | 1 | NULL when unset
    tags        TEXT,              -- JSON array
    ignored     INTEGER,           -- 0 | 1 | NULL when unset
    metadata    TEXT,              -- JSON object
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_records_app_id     ON query_records(app_id);
CREATE INDEX IF NOT EXISTS idx_query_records_created_at ON query_records(created_at);
CREATE INDEX IF NOT EXISTS idx_query_records_curated    ON query_records(curated);
CREATE INDEX IF NOT EXISTS idx_query_records_ignored    ON query_records(ignored);

CREATE TABLE IF NOT EXISTS feedbacks (
    id                      TEXT PRIMARY KEY,
    query_record_id         TEXT NOT NULL REFERENCES query_records(id) ON DELETE CASCADE,
    type                    TEXT NOT NULL
                            CHECK (type IN ('positive', 'negative', 'neutral', 'correction')),
    content                 TEXT,
    rating                  INTEGER CHECK (rating >= 1 AND rating <= 5),
    correction              TEXT,
    status                  TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'processed', 'resolved')),
    processed_at            TEXT,
    resolution              TEXT,
    optimization_suggestion TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feedbacks_query_record_id ON feedbacks(query_record_id);
CREATE INDEX IF NOT EXISTS idx_feedbacks_status          ON feedbacks(status);

CREATE TABLE IF NOT EXISTS datasets (
    id          TEXT PRIMARY KEY,
    app_id      TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    description TEXT,
    metadata    TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dataset_query_records (
    dataset_id      TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    query_record_id TEXT NOT NULL REFERENCES query_records(id) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    PRIMARY KEY (dataset_id, query_record_id)
);

CREATE INDEX IF NOT EXISTS idx_datasets_app_id ON datasets(app_id);
CREATE INDEX IF NOT EXISTS idx_dataset_query_records_dataset_id
    ON dataset_query_records(dataset_id);
CREATE INDEX IF NOT EXISTS idx_dataset_query_records_query_record_id
    ON dataset_query_records(query_record_id);

CREATE TABLE IF NOT EXISTS hit_analyses (
    id                      TEXT PRIMARY KEY,
    query_record_id         TEXT NOT NULL REFERENCES query_records(id) ON DELETE CASCADE,
    dataset_id              TEXT NOT NULL,
    match_type              TEXT NOT NULL
                            CHECK (match_type IN ('exact', 'high', 'medium', 'none')),
    similarity              REAL NOT NULL CHECK (similarity >= 0 AND similarity <= 100),
    matched_query_record_id TEXT,
    analysis_result         TEXT,  -- JSON value
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_hit_analyses_query_record_id ON hit_analyses(query_record_id);
CREATE INDEX IF NOT EXISTS idx_hit_analyses_dataset_id      ON hit_analyses(dataset_id);
CREATE INDEX IF NOT EXISTS idx_hit_analyses_match_type      ON hit_analyses(match_type);

CREATE TABLE IF NOT EXISTS evaluations (
    id              TEXT PRIMARY KEY,
    app_id          TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    dataset_id      TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    evaluation_type TEXT NOT NULL CHECK (evaluation_type IN ('before', 'after')),
    metrics         TEXT NOT NULL, -- JSON object
    evaluated_at    TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evaluation_query_records (
    evaluation_id   TEXT NOT NULL REFERENCES evaluations(id) ON DELETE CASCADE,
    query_record_id TEXT NOT NULL REFERENCES query_records(id) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    PRIMARY KEY (evaluation_id, query_record_id)
);

CREATE INDEX IF NOT EXISTS idx_evaluations_app_id          ON evaluations(app_id);
CREATE INDEX IF NOT EXISTS idx_evaluations_dataset_id      ON evaluations(dataset_id);
CREATE INDEX IF NOT EXISTS idx_evaluations_evaluation_type ON evaluations(evaluation_type);

CREATE TABLE IF NOT EXISTS optimization_suggestions (
    id          TEXT PRIMARY KEY,
    app_id      TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    source      TEXT NOT NULL CHECK (source IN ('feedback', 'hit-analysis', 'evaluation')),
    source_id   TEXT NOT NULL,
    priority    TEXT NOT NULL CHECK (priority IN ('high', 'medium', 'low')),
    content     TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'applied', 'rejected')),
    applied_at  TEXT,
    result      TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_optimization_suggestions_app_id ON optimization_suggestions(app_id);
CREATE INDEX IF NOT EXISTS idx_optimization_suggestions_status ON optimization_suggestions(status);
CREATE INDEX IF NOT EXISTS idx_optimization_suggestions_source ON optimization_suggestions(source);
";

pub const MODELS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS models (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    provider    TEXT NOT NULL,
    base_url    TEXT,
    api_key     TEXT,
    model       TEXT NOT NULL,
    metadata    TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";
