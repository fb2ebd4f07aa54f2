use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_id TEXT,
    color TEXT,
    is_inbox INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    color TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    description TEXT,
    project_id TEXT NOT NULL,
    parent_id TEXT,
    priority INTEGER NOT NULL DEFAULT 1,
    labels JSON NOT NULL DEFAULT '[]',
    due JSON,
    is_completed INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_metadata (
    task_id TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
    category TEXT,
    time_estimate TEXT,
    size TEXT,
    ai_confidence REAL,
    ai_reasoning TEXT,
    needs_supplies INTEGER NOT NULL DEFAULT 0,
    can_delegate INTEGER NOT NULL DEFAULT 0,
    energy_level TEXT,
    classification_source TEXT CHECK (classification_source IN ('ai', 'manual')),
    recommendation_applied INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One (value, classified_at) pair per classifiable field.
CREATE TABLE IF NOT EXISTS task_field_classifications (
    task_id TEXT NOT NULL REFERENCES task_metadata(task_id) ON DELETE CASCADE,
    field TEXT NOT NULL,
    value JSON NOT NULL,
    classified_at TEXT,
    PRIMARY KEY (task_id, field)
);

CREATE TABLE IF NOT EXISTS task_snapshots (
    task_id TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
    snapshot JSON NOT NULL,
    synced_at TEXT NOT NULL
);

-- Kept after task deletion; feeds duration learning.
CREATE TABLE IF NOT EXISTS completion_history (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    content TEXT NOT NULL,
    category TEXT,
    actual_minutes INTEGER,
    completed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
CREATE INDEX IF NOT EXISTS idx_completion_task ON completion_history(task_id);
"#;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
