mod schema;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

const TASK_COLUMNS: &str = "id, content, description, project_id, parent_id, priority, labels, due,
     is_completed, completed_at, created_at, updated_at";

const LAST_SYNC_KEY: &str = "last_sync_at";

/// How a reconciliation pass wants a task's metadata changed alongside its
/// snapshot overwrite.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    Unchanged,
    /// Drop every classified value and its timestamp.
    ClearClassifications,
    /// Record a user override: source becomes `manual`, and the recommended
    /// category is re-derived when the new project maps to one.
    ManualOverride {
        recommended_category: Option<String>,
        classified_at: DateTime<Utc>,
    },
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "tasksync")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("tasksync.db"))
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Run raw statements against the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("database lock poisoned");
        f(&conn)
    }

    // ============================================================
    // Task operations
    // ============================================================

    /// Upsert a batch of tasks in one transaction. Returns the batch size.
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        for task in tasks {
            upsert_task(&tx, task)?;
        }
        tx.commit()?;
        Ok(tasks.len())
    }

    pub fn upsert_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        upsert_task(&conn, task)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS),
                [id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.include_completed {
            conditions.push("is_completed = 0");
        }
        if let Some(project_id) = &filter.project_id {
            conditions.push("project_id = ?");
            params.push(Box::new(project_id.clone()));
        }

        let mut sql = format!("SELECT {} FROM tasks", TASK_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY priority DESC, created_at");

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params_ref.as_slice(), task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Labels live in a JSON column; filter in memory.
        Ok(match &filter.label {
            Some(label) => tasks
                .into_iter()
                .filter(|t| t.labels.iter().any(|l| l == label))
                .collect(),
            None => tasks,
        })
    }

    pub fn get_task_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT id FROM tasks")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Delete a task; metadata, classifications and snapshot go with it.
    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Project and label operations
    // ============================================================

    pub fn save_projects(&self, projects: &[Project]) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        for project in projects {
            tx.execute(
                "INSERT INTO projects (id, name, parent_id, color, is_inbox)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    parent_id = excluded.parent_id,
                    color = excluded.color,
                    is_inbox = excluded.is_inbox",
                (
                    &project.id,
                    &project.name,
                    &project.parent_id,
                    &project.color,
                    project.is_inbox as i32,
                ),
            )?;
        }
        tx.commit()?;
        Ok(projects.len())
    }

    pub fn get_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt =
            conn.prepare("SELECT id, name, parent_id, color, is_inbox FROM projects ORDER BY name")?;

        let projects = stmt
            .query_map([], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_id: row.get(2)?,
                    color: row.get(3)?,
                    is_inbox: row.get::<_, i32>(4)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn save_labels(&self, labels: &[Label]) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        for label in labels {
            tx.execute(
                "INSERT INTO labels (id, name, color) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, color = excluded.color",
                (&label.id, &label.name, &label.color),
            )?;
        }
        tx.commit()?;
        Ok(labels.len())
    }

    pub fn get_labels(&self) -> Result<Vec<Label>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT id, name, color FROM labels ORDER BY name")?;

        let labels = stmt
            .query_map([], |row| {
                Ok(Label {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(labels)
    }

    // ============================================================
    // Metadata operations
    // ============================================================

    pub fn get_task_metadata(&self, task_id: &str) -> Result<Option<TaskMetadata>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        load_metadata(&conn, task_id)
    }

    pub fn get_all_metadata(&self) -> Result<HashMap<String, TaskMetadata>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT task_id FROM task_metadata")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut all = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(meta) = load_metadata(&conn, &id)? {
                all.insert(id, meta);
            }
        }
        Ok(all)
    }

    /// Set exactly one metadata value, creating the metadata row if needed.
    ///
    /// For classified fields a `null` value removes the pair.
    pub fn save_field_metadata(
        &self,
        task_id: &str,
        field: MetadataField,
        value: serde_json::Value,
        classified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        ensure_metadata_row(&tx, task_id)?;

        match field {
            MetadataField::RecommendationApplied => {
                let applied = value.as_bool().ok_or_else(|| invalid(field, &value))?;
                tx.execute(
                    "UPDATE task_metadata SET recommendation_applied = ?, updated_at = ? WHERE task_id = ?",
                    (applied as i32, Utc::now().to_rfc3339(), task_id),
                )?;
            }
            MetadataField::ClassificationSource => {
                let source = match &value {
                    serde_json::Value::Null => None,
                    other => Some(
                        other
                            .as_str()
                            .and_then(ClassificationSource::from_str)
                            .ok_or_else(|| invalid(field, &value))?,
                    ),
                };
                set_classification_source(&tx, task_id, source)?;
            }
            _ => {
                if let Some(classified) = field.classified() {
                    write_classification(&tx, task_id, classified, &value, classified_at)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn save_metadata_details(&self, task_id: &str, details: &MetadataDetails) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        ensure_metadata_row(&tx, task_id)?;

        tx.execute(
            "UPDATE task_metadata SET
                category = COALESCE(?, category),
                time_estimate = COALESCE(?, time_estimate),
                size = COALESCE(?, size),
                ai_confidence = COALESCE(?, ai_confidence),
                ai_reasoning = COALESCE(?, ai_reasoning),
                needs_supplies = COALESCE(?, needs_supplies),
                can_delegate = COALESCE(?, can_delegate),
                energy_level = COALESCE(?, energy_level),
                updated_at = ?
             WHERE task_id = ?",
            (
                &details.category,
                &details.time_estimate,
                &details.size,
                details.ai_confidence,
                &details.ai_reasoning,
                details.needs_supplies.map(|b| b as i32),
                details.can_delegate.map(|b| b as i32),
                &details.energy_level,
                Utc::now().to_rfc3339(),
                task_id,
            ),
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn clear_classifications(&self, task_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        clear_classifications(&conn, task_id)
    }

    // ============================================================
    // Snapshot operations
    // ============================================================

    pub fn get_last_synced_state(&self, task_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row = conn
            .query_row(
                "SELECT snapshot, synced_at FROM task_snapshots WHERE task_id = ?",
                [task_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((json, synced_at)) = row else {
            return Ok(None);
        };

        let task = serde_json::from_str(&json).map_err(|source| Error::MalformedSnapshot {
            task_id: task_id.to_string(),
            source,
        })?;

        Ok(Some(Snapshot {
            task,
            synced_at: parse_datetime(synced_at),
        }))
    }

    pub fn save_last_synced_state(&self, task: &Task, synced_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        write_snapshot(&conn, task, synced_at)
    }

    /// Apply a reconciliation outcome and overwrite the snapshot in a single
    /// transaction.
    pub fn apply_reconciliation(
        &self,
        task: &Task,
        synced_at: DateTime<Utc>,
        update: &MetadataUpdate,
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        match update {
            MetadataUpdate::Unchanged => {}
            MetadataUpdate::ClearClassifications => clear_classifications(&tx, &task.id)?,
            MetadataUpdate::ManualOverride {
                recommended_category,
                classified_at,
            } => {
                ensure_metadata_row(&tx, &task.id)?;
                if let Some(category) = recommended_category {
                    write_classification(
                        &tx,
                        &task.id,
                        ClassifiedField::RecommendedCategory,
                        &serde_json::Value::String(category.clone()),
                        Some(*classified_at),
                    )?;
                }
                set_classification_source(&tx, &task.id, Some(ClassificationSource::Manual))?;
            }
        }

        write_snapshot(&tx, task, synced_at)?;
        tx.commit()?;
        Ok(())
    }

    // ============================================================
    // Completion history
    // ============================================================

    pub fn record_completion(
        &self,
        task: &Task,
        category: Option<String>,
        actual_minutes: Option<i64>,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionRecord> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();

        conn.execute(
            "INSERT INTO completion_history (id, task_id, content, category, actual_minutes, completed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &task.id,
                &task.content,
                &category,
                actual_minutes,
                completed_at.to_rfc3339(),
            ),
        )?;

        Ok(CompletionRecord {
            id,
            task_id: task.id.clone(),
            content: task.content.clone(),
            category,
            actual_minutes,
            completed_at,
        })
    }

    pub fn get_completion_history(&self, task_id: Option<&str>) -> Result<Vec<CompletionRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, task_id, content, category, actual_minutes, completed_at
             FROM completion_history
             WHERE (?1 IS NULL OR task_id = ?1)
             ORDER BY completed_at DESC",
        )?;

        let records = stmt
            .query_map([task_id], |row| {
                Ok(CompletionRecord {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    task_id: row.get(1)?,
                    content: row.get(2)?,
                    category: row.get(3)?,
                    actual_minutes: row.get(4)?,
                    completed_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ============================================================
    // Sync state
    // ============================================================

    pub fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO sync_state (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (LAST_SYNC_KEY, at.to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                [LAST_SYNC_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.map(parse_datetime))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn upsert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, content, description, project_id, parent_id, priority, labels, due,
                            is_completed, completed_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            content = excluded.content,
            description = excluded.description,
            project_id = excluded.project_id,
            parent_id = excluded.parent_id,
            priority = excluded.priority,
            labels = excluded.labels,
            due = excluded.due,
            is_completed = excluded.is_completed,
            completed_at = excluded.completed_at,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at",
        (
            &task.id,
            &task.content,
            &task.description,
            &task.project_id,
            &task.parent_id,
            task.priority,
            serde_json::to_string(&task.labels)?,
            task.due.as_ref().map(serde_json::to_string).transpose()?,
            task.is_completed as i32,
            task.completed_at.map(|d| d.to_rfc3339()),
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
        ),
    )?;
    Ok(())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let labels: String = row.get(6)?;
    let due: Option<String> = row.get(7)?;

    Ok(Task {
        id: row.get(0)?,
        content: row.get(1)?,
        description: row.get(2)?,
        project_id: row.get(3)?,
        parent_id: row.get(4)?,
        priority: row.get(5)?,
        labels: serde_json::from_str(&labels).unwrap_or_default(),
        due: due.and_then(|d| serde_json::from_str(&d).ok()),
        is_completed: row.get::<_, i32>(8)? != 0,
        completed_at: row.get::<_, Option<String>>(9)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn ensure_metadata_row(conn: &Connection, task_id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?)",
        [task_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(Error::TaskNotFound(task_id.to_string()));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO task_metadata (task_id, created_at, updated_at) VALUES (?, ?, ?)",
        (task_id, &now, &now),
    )?;
    Ok(())
}

fn load_metadata(conn: &Connection, task_id: &str) -> Result<Option<TaskMetadata>> {
    let meta = conn
        .query_row(
            "SELECT task_id, category, time_estimate, size, ai_confidence, ai_reasoning,
                    needs_supplies, can_delegate, energy_level, classification_source,
                    recommendation_applied, created_at, updated_at
             FROM task_metadata WHERE task_id = ?",
            [task_id],
            |row| {
                Ok(TaskMetadata {
                    task_id: row.get(0)?,
                    category: row.get(1)?,
                    time_estimate: row.get(2)?,
                    size: row.get(3)?,
                    ai_confidence: row.get(4)?,
                    ai_reasoning: row.get(5)?,
                    needs_supplies: row.get::<_, i32>(6)? != 0,
                    can_delegate: row.get::<_, i32>(7)? != 0,
                    energy_level: row.get(8)?,
                    classification_source: row
                        .get::<_, Option<String>>(9)?
                        .as_deref()
                        .and_then(ClassificationSource::from_str),
                    recommendation_applied: row.get::<_, i32>(10)? != 0,
                    fields: Default::default(),
                    created_at: parse_datetime(row.get::<_, String>(11)?),
                    updated_at: parse_datetime(row.get::<_, String>(12)?),
                })
            },
        )
        .optional()?;

    let Some(mut meta) = meta else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT field, value, classified_at FROM task_field_classifications WHERE task_id = ?",
    )?;
    let rows = stmt
        .query_map([task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (field, value, classified_at) in rows {
        let Some(field) = ClassifiedField::from_str(&field) else {
            tracing::debug!(task_id, field = %field, "Ignoring unknown classified field");
            continue;
        };
        meta.fields.insert(
            field,
            Classification {
                value: serde_json::from_str(&value).unwrap_or(serde_json::Value::Null),
                classified_at: classified_at.map(parse_datetime),
            },
        );
    }

    Ok(Some(meta))
}

fn write_classification(
    conn: &Connection,
    task_id: &str,
    field: ClassifiedField,
    value: &serde_json::Value,
    classified_at: Option<DateTime<Utc>>,
) -> Result<()> {
    if value.is_null() {
        conn.execute(
            "DELETE FROM task_field_classifications WHERE task_id = ? AND field = ?",
            (task_id, field.as_str()),
        )?;
    } else {
        conn.execute(
            "INSERT INTO task_field_classifications (task_id, field, value, classified_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(task_id, field) DO UPDATE SET
                value = excluded.value,
                classified_at = excluded.classified_at",
            (
                task_id,
                field.as_str(),
                serde_json::to_string(value)?,
                classified_at.map(|d| d.to_rfc3339()),
            ),
        )?;
    }

    conn.execute(
        "UPDATE task_metadata SET updated_at = ? WHERE task_id = ?",
        (Utc::now().to_rfc3339(), task_id),
    )?;
    Ok(())
}

fn set_classification_source(
    conn: &Connection,
    task_id: &str,
    source: Option<ClassificationSource>,
) -> Result<()> {
    conn.execute(
        "UPDATE task_metadata SET classification_source = ?, updated_at = ? WHERE task_id = ?",
        (
            source.map(|s| s.as_str()),
            Utc::now().to_rfc3339(),
            task_id,
        ),
    )?;
    Ok(())
}

fn clear_classifications(conn: &Connection, task_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM task_field_classifications WHERE task_id = ?",
        [task_id],
    )?;
    conn.execute(
        "UPDATE task_metadata
         SET category = NULL, classification_source = NULL, recommendation_applied = 0, updated_at = ?
         WHERE task_id = ?",
        (Utc::now().to_rfc3339(), task_id),
    )?;
    Ok(())
}

fn write_snapshot(conn: &Connection, task: &Task, synced_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO task_snapshots (task_id, snapshot, synced_at) VALUES (?, ?, ?)
         ON CONFLICT(task_id) DO UPDATE SET
            snapshot = excluded.snapshot,
            synced_at = excluded.synced_at",
        (&task.id, serde_json::to_string(task)?, synced_at.to_rfc3339()),
    )?;
    Ok(())
}

fn invalid(field: MetadataField, value: &serde_json::Value) -> Error {
    Error::InvalidValue {
        field: field.as_str().to_string(),
        value: value.to_string(),
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
