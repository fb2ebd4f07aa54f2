use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{ClassificationSource, Project, Task, TaskMetadata};
use crate::taxonomy::Taxonomy;

/// A task filed under a project that disagrees with its recommended
/// category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictInfo {
    pub task_id: String,
    pub content: String,
    pub project_id: String,
    pub project_name: Option<String>,
    /// Category the current project maps to, if any.
    pub project_category: Option<String>,
    pub recommended_category: String,
    pub recommended_project_id: Option<String>,
    pub classification_source: Option<ClassificationSource>,
}

/// Open tasks whose project does not match their recommended category.
pub fn find_conflicts(
    tasks: &[Task],
    projects: &[Project],
    metadata: &HashMap<String, TaskMetadata>,
    taxonomy: &Taxonomy,
) -> Vec<ConflictInfo> {
    let project_names: HashMap<&str, &str> = projects
        .iter()
        .map(|p| (p.id.as_str(), p.name.as_str()))
        .collect();

    tasks
        .iter()
        .filter(|task| !task.is_completed)
        .filter_map(|task| {
            let meta = metadata.get(&task.id)?;
            let recommended = meta.recommended_category()?;
            let project_category = taxonomy.category_from_project(&task.project_id);
            if project_category == Some(recommended) {
                return None;
            }

            Some(ConflictInfo {
                task_id: task.id.clone(),
                content: task.content.clone(),
                project_id: task.project_id.clone(),
                project_name: project_names
                    .get(task.project_id.as_str())
                    .map(|name| name.to_string()),
                project_category: project_category.map(str::to_string),
                recommended_category: recommended.to_string(),
                recommended_project_id: taxonomy
                    .project_from_category(recommended)
                    .map(str::to_string),
                classification_source: meta.classification_source,
            })
        })
        .collect()
}
