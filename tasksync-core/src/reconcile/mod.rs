//! Reconciliation engine.
//!
//! Compares a task as currently reported by the remote provider against the
//! last synced snapshot, attributes every drift either to a manual edit made
//! after the last classification or to drift that predates it, and decides
//! whether the task needs to be classified again.
//!
//! Everything here is pure: no I/O, no clock, no hidden state.

mod compare;
mod conflicts;
mod content;

pub use compare::{diff_tasks, tracked_values, FieldValue, TrackedField};
pub use conflicts::{find_conflicts, ConflictInfo};
pub use content::{is_significant_change, normalize, SignificanceThresholds};

use serde::{Deserialize, Serialize};

use crate::models::{Snapshot, Task, TaskMetadata};

pub const REASON_NEVER_CLASSIFIED: &str = "never classified";
pub const REASON_NO_RECOMMENDATION: &str = "no recommended category";
pub const REASON_NO_SNAPSHOT: &str = "no snapshot to compare";
pub const REASON_NO_CHANGES: &str = "no changes";
pub const REASON_CHANGES_BEFORE_CLASSIFICATION: &str = "changes before classification";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: TrackedField,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    /// The remote edit happened after the task was last classified.
    pub changed_manually: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeAnalysis {
    pub task_id: String,
    pub changed_fields: Vec<FieldChange>,
    pub project_changed_manually: bool,
    pub content_changed_manually: bool,
    /// A manual content change that passed the significance test.
    pub content_change_significant: bool,
    pub any_changed_manually: bool,
    pub needs_reclassify: bool,
    pub reason: String,
}

impl ChangeAnalysis {
    fn unchanged(task_id: &str, needs_reclassify: bool, reason: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            changed_fields: Vec::new(),
            project_changed_manually: false,
            content_changed_manually: false,
            content_change_significant: false,
            any_changed_manually: false,
            needs_reclassify,
            reason: reason.to_string(),
        }
    }

    pub fn changed_manually(&self, field: TrackedField) -> bool {
        self.changed_fields
            .iter()
            .any(|c| c.field == field && c.changed_manually)
    }

    pub fn manual_fields(&self) -> impl Iterator<Item = TrackedField> + '_ {
        self.changed_fields
            .iter()
            .filter(|c| c.changed_manually)
            .map(|c| c.field)
    }
}

/// Change detection with a fixed set of significance thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    thresholds: SignificanceThresholds,
}

impl Reconciler {
    pub fn new(thresholds: SignificanceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect_changes(
        &self,
        remote: &Task,
        metadata: Option<&TaskMetadata>,
        snapshot: Option<&Snapshot>,
    ) -> ChangeAnalysis {
        let Some(metadata) = metadata else {
            return ChangeAnalysis::unchanged(&remote.id, true, REASON_NEVER_CLASSIFIED);
        };

        let has_recommendation = metadata.recommended_category().is_some();

        let Some(snapshot) = snapshot else {
            let reason = if has_recommendation {
                REASON_NO_SNAPSHOT
            } else {
                REASON_NO_RECOMMENDATION
            };
            return ChangeAnalysis::unchanged(&remote.id, !has_recommendation, reason);
        };

        // Without a category timestamp nothing has been classified yet, so any
        // observed edit is necessarily newer than the (absent) classification.
        let after_classification = metadata
            .category_classified_at()
            .map_or(true, |classified_at| remote.updated_at > classified_at);

        let mut content_change_significant = false;
        let changed_fields: Vec<FieldChange> = diff_tasks(remote, &snapshot.task)
            .into_iter()
            .map(|(field, old, new)| {
                if field == TrackedField::Content && after_classification {
                    content_change_significant = is_significant_change(
                        old.as_text().unwrap_or_default(),
                        new.as_text().unwrap_or_default(),
                        &self.thresholds,
                    );
                }
                FieldChange {
                    field,
                    old_value: old.to_json(),
                    new_value: new.to_json(),
                    changed_manually: after_classification,
                }
            })
            .collect();

        let mut analysis = ChangeAnalysis {
            task_id: remote.id.clone(),
            project_changed_manually: false,
            content_changed_manually: false,
            content_change_significant,
            any_changed_manually: changed_fields.iter().any(|c| c.changed_manually),
            needs_reclassify: false,
            reason: String::new(),
            changed_fields,
        };
        analysis.project_changed_manually = analysis.changed_manually(TrackedField::ProjectId);
        analysis.content_changed_manually = analysis.changed_manually(TrackedField::Content);

        analysis.needs_reclassify = !has_recommendation
            || analysis.project_changed_manually
            || analysis.content_change_significant;

        analysis.reason = if analysis.any_changed_manually {
            let names: Vec<&str> = analysis.manual_fields().map(|f| f.as_str()).collect();
            format!("changed manually: {}", names.join(", "))
        } else if !has_recommendation {
            REASON_NO_RECOMMENDATION.to_string()
        } else if analysis.changed_fields.is_empty() {
            REASON_NO_CHANGES.to_string()
        } else {
            REASON_CHANGES_BEFORE_CLASSIFICATION.to_string()
        };

        analysis
    }
}

/// [`Reconciler::detect_changes`] with default thresholds.
pub fn detect_changes(
    remote: &Task,
    metadata: Option<&TaskMetadata>,
    snapshot: Option<&Snapshot>,
) -> ChangeAnalysis {
    Reconciler::default().detect_changes(remote, metadata, snapshot)
}
