//! Sync engine.
//!
//! A pass pulls tasks, projects and labels from the remote provider,
//! persists them, reconciles every task against its last snapshot and
//! metadata, and overwrites the snapshot. Single-task mutations go to the
//! remote provider first and are then mirrored locally.

mod locks;
mod scheduler;
mod state;

pub use locks::TaskLocks;
pub use scheduler::spawn_scheduler;
pub use state::{PassGuard, SyncGate, SyncPhase};

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasksync_core::db::MetadataUpdate;
use tasksync_core::models::*;
use tasksync_core::reconcile::{self, ChangeAnalysis, ConflictInfo, Reconciler, TrackedField};
use tasksync_core::{Database, TaxonomyHandle};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::provider::{ProviderError, RemoteProvider};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] tasksync_core::Error),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

/// Summary of one `sync_now` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub success: bool,
    /// Another pass was running; nothing was done.
    pub skipped: bool,
    pub tasks_count: usize,
    pub projects_count: usize,
    pub labels_count: usize,
    pub new_tasks_count: usize,
    pub new_task_ids: Vec<String>,
    pub reconciled_count: usize,
    pub reclassify_count: usize,
    /// Tasks whose reconciliation failed; their snapshots stay stale.
    pub failed_tasks: Vec<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl SyncResult {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn failed(error: String, duration_ms: u64) -> Self {
        Self {
            error: Some(error),
            duration_ms,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub standalone: bool,
}

pub struct SyncEngine {
    db: Database,
    provider: Option<Arc<dyn RemoteProvider>>,
    taxonomy: TaxonomyHandle,
    reconciler: Reconciler,
    request_timeout: Duration,
    gate: SyncGate,
    locks: TaskLocks,
    last_error: Mutex<Option<String>>,
}

impl SyncEngine {
    /// `provider = None` runs in standalone mode: no remote, locally
    /// generated task identifiers.
    pub fn new(
        db: Database,
        provider: Option<Arc<dyn RemoteProvider>>,
        taxonomy: TaxonomyHandle,
    ) -> Self {
        Self {
            db,
            provider,
            taxonomy,
            reconciler: Reconciler::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            gate: SyncGate::new(),
            locks: TaskLocks::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn taxonomy(&self) -> &TaxonomyHandle {
        &self.taxonomy
    }

    pub fn phase(&self) -> SyncPhase {
        self.gate.phase()
    }

    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        Ok(SyncStatus {
            phase: self.phase(),
            last_sync_at: self.db.get_last_sync_time()?,
            last_error: self.last_error.lock().expect("sync state poisoned").clone(),
            standalone: self.provider.is_none(),
        })
    }

    // ============================================================
    // Full pass
    // ============================================================

    /// Run one synchronization pass, or report `skipped` if one is already
    /// running. Never blocks on another pass and never panics on failure.
    pub async fn sync_now(&self) -> SyncResult {
        let Some(guard) = self.gate.try_begin() else {
            info!(phase = self.phase().as_str(), "Sync already in progress, skipping");
            return SyncResult::skipped();
        };

        let started = Instant::now();
        info!("Starting sync pass");

        let outcome = self.run_pass(&guard).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let mut last_error = self.last_error.lock().expect("sync state poisoned");

        match outcome {
            Ok(mut result) => {
                result.duration_ms = duration_ms;
                *last_error = None;
                info!(
                    tasks = result.tasks_count,
                    projects = result.projects_count,
                    labels = result.labels_count,
                    new_tasks = result.new_tasks_count,
                    reclassify = result.reclassify_count,
                    failed = result.failed_tasks.len(),
                    duration_ms,
                    "Sync pass complete"
                );
                result
            }
            Err(e) => {
                error!(error = %e, duration_ms, "Sync pass failed");
                *last_error = Some(e.to_string());
                SyncResult::failed(e.to_string(), duration_ms)
            }
        }
    }

    async fn run_pass(&self, guard: &PassGuard<'_>) -> Result<SyncResult, SyncError> {
        let provider = self.provider()?;

        let (tasks, projects, labels) = tokio::try_join!(
            self.remote("list_tasks", provider.list_tasks()),
            self.remote("list_projects", provider.list_projects()),
            self.remote("list_labels", provider.list_labels()),
        )?;
        debug!(
            tasks = tasks.len(),
            projects = projects.len(),
            labels = labels.len(),
            "Fetched remote state"
        );

        guard.advance(SyncPhase::Persisting);
        let known = self.db.get_task_ids()?;
        let new_task_ids: Vec<String> = tasks
            .iter()
            .filter(|t| !known.contains(&t.id))
            .map(|t| t.id.clone())
            .collect();

        let mut result = SyncResult {
            success: true,
            tasks_count: self.db.save_tasks(&tasks)?,
            projects_count: self.db.save_projects(&projects)?,
            labels_count: self.db.save_labels(&labels)?,
            new_tasks_count: new_task_ids.len(),
            new_task_ids,
            ..Default::default()
        };

        guard.advance(SyncPhase::Reconciling);
        let synced_at = Utc::now();
        for task in &tasks {
            match self.reconcile_task(task, synced_at).await {
                Ok(analysis) => {
                    result.reconciled_count += 1;
                    if analysis.needs_reclassify {
                        result.reclassify_count += 1;
                    }
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Reconciliation failed; snapshot left stale");
                    result.failed_tasks.push(task.id.clone());
                }
            }
        }

        self.db.set_last_sync_time(synced_at)?;
        Ok(result)
    }

    /// Read metadata and snapshot, compare, then update metadata and
    /// snapshot together, all under the task's lock.
    async fn reconcile_task(
        &self,
        task: &Task,
        synced_at: DateTime<Utc>,
    ) -> Result<ChangeAnalysis, tasksync_core::Error> {
        let _lock = self.locks.lock(&task.id).await;

        let metadata = self.db.get_task_metadata(&task.id)?;
        let snapshot = self.db.get_last_synced_state(&task.id)?;
        let analysis = self
            .reconciler
            .detect_changes(task, metadata.as_ref(), snapshot.as_ref());

        let update = self.metadata_update(task, &analysis, synced_at);
        self.db.apply_reconciliation(task, synced_at, &update)?;

        Ok(analysis)
    }

    fn metadata_update(
        &self,
        task: &Task,
        analysis: &ChangeAnalysis,
        synced_at: DateTime<Utc>,
    ) -> MetadataUpdate {
        if !analysis.any_changed_manually {
            return MetadataUpdate::Unchanged;
        }

        if analysis.content_change_significant {
            info!(task_id = %task.id, reason = %analysis.reason, "Content rewritten; clearing classification");
            return MetadataUpdate::ClearClassifications;
        }

        if analysis.project_changed_manually || analysis.changed_manually(TrackedField::Labels) {
            let taxonomy = self.taxonomy.current();
            let recommended_category = taxonomy
                .category_from_project(&task.project_id)
                .map(str::to_string);
            if recommended_category.is_none() {
                warn!(
                    task_id = %task.id,
                    project_id = %task.project_id,
                    "Project has no mapped category; keeping previous recommendation"
                );
            }
            info!(
                task_id = %task.id,
                category = ?recommended_category,
                reason = %analysis.reason,
                "Manual override detected"
            );
            return MetadataUpdate::ManualOverride {
                recommended_category,
                classified_at: synced_at,
            };
        }

        MetadataUpdate::Unchanged
    }

    // ============================================================
    // Single-task mutations
    // ============================================================

    pub async fn create_task(&self, input: CreateTaskInput) -> Result<Task, SyncError> {
        let task = match &self.provider {
            Some(provider) => {
                self.remote("create_task", provider.create_task(&input))
                    .await?
            }
            None => standalone_task(input),
        };

        self.db.upsert_task(&task)?;
        info!(task_id = %task.id, "Task created");
        Ok(task)
    }

    pub async fn push_update(
        &self,
        task_id: &str,
        patch: UpdateTaskInput,
    ) -> Result<Task, SyncError> {
        let _lock = self.locks.lock(task_id).await;
        let local = self.local_task(task_id)?;

        let mut updated = local.clone();
        updated.apply(&patch);
        updated.updated_at = Utc::now();

        if let Some(provider) = &self.provider {
            let fields = patch.without_project();
            if !fields.is_empty() {
                updated = self
                    .remote("update_task", provider.update_task(task_id, &fields))
                    .await?;
            }
            if let Some(project_id) = patch.project_id.as_ref().filter(|p| **p != local.project_id) {
                self.remote("move_task", provider.move_task(task_id, project_id))
                    .await?;
                updated.project_id = project_id.clone();
            }
        }

        self.db.upsert_task(&updated)?;
        debug!(task_id, "Task update pushed");
        Ok(updated)
    }

    pub async fn complete_task(
        &self,
        task_id: &str,
        input: CompleteTaskInput,
    ) -> Result<CompletionRecord, SyncError> {
        let _lock = self.locks.lock(task_id).await;
        let mut task = self.local_task(task_id)?;

        if let Some(provider) = &self.provider {
            self.remote("close_task", provider.close_task(task_id))
                .await?;
        }

        let now = Utc::now();
        task.is_completed = true;
        task.completed_at = Some(now);
        task.updated_at = now;
        self.db.upsert_task(&task)?;

        let category = self.db.get_task_metadata(task_id)?.and_then(|meta| {
            meta.category
                .clone()
                .or_else(|| meta.recommended_category().map(str::to_string))
        });
        let record = self
            .db
            .record_completion(&task, category, input.actual_minutes, now)?;

        info!(task_id, "Task completed");
        Ok(record)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<bool, SyncError> {
        let deleted = {
            let _lock = self.locks.lock(task_id).await;
            self.local_task(task_id)?;

            if let Some(provider) = &self.provider {
                self.remote("delete_task", provider.delete_task(task_id))
                    .await?;
            }
            self.db.delete_task(task_id)?
        };

        self.locks.forget(task_id);
        info!(task_id, "Task deleted");
        Ok(deleted)
    }

    // ============================================================
    // Queries for enrichment and review
    // ============================================================

    /// Analysis of a stored task against its snapshot. Read-only.
    pub fn analyze_task(&self, task_id: &str) -> Result<Option<ChangeAnalysis>, SyncError> {
        let Some(task) = self.db.get_task(task_id)? else {
            return Ok(None);
        };
        let metadata = self.db.get_task_metadata(task_id)?;
        let snapshot = self.db.get_last_synced_state(task_id)?;
        Ok(Some(self.reconciler.detect_changes(
            &task,
            metadata.as_ref(),
            snapshot.as_ref(),
        )))
    }

    /// Open tasks the enrichment pipeline should classify next.
    pub fn tasks_needing_classification(&self) -> Result<Vec<ChangeAnalysis>, SyncError> {
        let mut pending = Vec::new();
        for task in self.db.get_tasks(&TaskFilter::default())? {
            let analysis = match self.analyze_task(&task.id) {
                Ok(Some(analysis)) => analysis,
                Ok(None) => continue,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Skipping task with unreadable state");
                    continue;
                }
            };
            if analysis.needs_reclassify {
                pending.push(analysis);
            }
        }
        Ok(pending)
    }

    /// Hold a task's lock across an external read-classify-write sequence.
    /// Reconciliation and mutations of that task wait until the guard drops.
    pub async fn lock_task(&self, task_id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(task_id).await
    }

    /// Store one enrichment result. The task must already exist locally.
    pub async fn save_classification(
        &self,
        task_id: &str,
        field: MetadataField,
        value: serde_json::Value,
        classified_at: Option<DateTime<Utc>>,
    ) -> Result<(), SyncError> {
        let _lock = self.lock_task(task_id).await;
        self.db
            .save_field_metadata(task_id, field, value, classified_at)?;
        Ok(())
    }

    /// Merge descriptive enrichment output, including the applied
    /// `category` later recorded on completion. Unset fields are kept.
    pub async fn save_details(
        &self,
        task_id: &str,
        details: &MetadataDetails,
    ) -> Result<TaskMetadata, SyncError> {
        let _lock = self.lock_task(task_id).await;
        self.db.save_metadata_details(task_id, details)?;
        self.db
            .get_task_metadata(task_id)?
            .ok_or_else(|| tasksync_core::Error::TaskNotFound(task_id.to_string()).into())
    }

    pub fn find_conflicts(&self) -> Result<Vec<ConflictInfo>, SyncError> {
        let tasks = self.db.get_tasks(&TaskFilter::default())?;
        let projects = self.db.get_projects()?;
        let metadata = self.db.get_all_metadata()?;
        Ok(reconcile::find_conflicts(
            &tasks,
            &projects,
            &metadata,
            &self.taxonomy.current(),
        ))
    }

    // ============================================================
    // Helpers
    // ============================================================

    fn provider(&self) -> Result<&Arc<dyn RemoteProvider>, SyncError> {
        self.provider
            .as_ref()
            .ok_or(SyncError::Provider(ProviderError::Unavailable))
    }

    fn local_task(&self, task_id: &str) -> Result<Task, SyncError> {
        self.db
            .get_task(task_id)?
            .ok_or_else(|| tasksync_core::Error::TaskNotFound(task_id.to_string()).into())
    }

    /// Bound a remote call by the request timeout.
    async fn remote<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout {
                operation,
                seconds: self.request_timeout.as_secs(),
            }),
        }
    }
}

fn standalone_task(input: CreateTaskInput) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4().to_string(),
        content: input.content,
        description: input.description,
        project_id: input.project_id,
        parent_id: input.parent_id,
        priority: input.priority.unwrap_or(1),
        labels: input.labels,
        due: input.due,
        is_completed: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}
