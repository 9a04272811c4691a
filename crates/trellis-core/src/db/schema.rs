//! SQLite schema for a board.
//!
//! - `pages` is the page tree; `parent_id IS NULL` is the root group and
//!   `is_deleted` marks soft-deleted pages
//! - `columns` belong to a page and are removed with it
//! - `tasks` belong to a column and carry their page for page-scoped loads
//! - `board_meta` records the schema version

/// Migration v1: entity tables and board metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    parent_id TEXT REFERENCES pages(id) ON DELETE SET NULL,
    title TEXT NOT NULL,
    position INTEGER NOT NULL CHECK (position >= 0),
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    CHECK (id LIKE 'pg-%'),
    CHECK (parent_id IS NULL OR parent_id <> id)
);

CREATE TABLE IF NOT EXISTS columns (
    id TEXT PRIMARY KEY,
    page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    position INTEGER NOT NULL CHECK (position >= 0),
    created_at_us INTEGER NOT NULL,
    CHECK (id LIKE 'col-%')
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    column_id TEXT NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
    page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    position INTEGER NOT NULL CHECK (position >= 0),
    created_at_us INTEGER NOT NULL,
    CHECK (id LIKE 'tk-%')
);

CREATE TABLE IF NOT EXISTS board_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO board_meta (id, schema_version, created_at_us)
VALUES (1, 1, CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER));
";

/// Migration v2: group-order indexes for scoped loads.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_pages_parent_position
    ON pages(parent_id, position);

CREATE INDEX IF NOT EXISTS idx_pages_deleted
    ON pages(is_deleted);

CREATE INDEX IF NOT EXISTS idx_columns_page_position
    ON columns(page_id, position);

CREATE INDEX IF NOT EXISTS idx_tasks_column_position
    ON tasks(column_id, position);

CREATE INDEX IF NOT EXISTS idx_tasks_page
    ON tasks(page_id);
";

/// Indexes expected by the load and reorder paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_pages_parent_position",
    "idx_pages_deleted",
    "idx_columns_page_position",
    "idx_tasks_column_position",
    "idx_tasks_page",
];
