//! Category ↔ project mapping.
//!
//! The mapping is a bijection: every category is filed under exactly one
//! project and no project serves two categories. It is built explicitly at
//! startup and swapped atomically through [`TaxonomyHandle::reload`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryMapping {
    pub name: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    by_category: HashMap<String, String>,
    by_project: HashMap<String, String>,
}

impl Taxonomy {
    pub fn new(mappings: &[CategoryMapping]) -> Result<Self> {
        let mut taxonomy = Self::default();

        for mapping in mappings {
            let name = mapping.name.trim();
            let project_id = mapping.project_id.trim();
            if name.is_empty() || project_id.is_empty() {
                return Err(Error::Taxonomy(
                    "category name and project id must be non-empty".into(),
                ));
            }
            if taxonomy.by_category.contains_key(name) {
                return Err(Error::Taxonomy(format!("duplicate category '{}'", name)));
            }
            if let Some(existing) = taxonomy.by_project.get(project_id) {
                return Err(Error::Taxonomy(format!(
                    "project '{}' is mapped to both '{}' and '{}'",
                    project_id, existing, name
                )));
            }

            taxonomy
                .by_category
                .insert(name.to_string(), project_id.to_string());
            taxonomy
                .by_project
                .insert(project_id.to_string(), name.to_string());
        }

        Ok(taxonomy)
    }

    pub fn category_from_project(&self, project_id: &str) -> Option<&str> {
        self.by_project.get(project_id).map(String::as_str)
    }

    pub fn project_from_category(&self, category: &str) -> Option<&str> {
        self.by_category.get(category).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_category.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

/// Shared, reloadable view of the current taxonomy.
///
/// Readers take a cheap `Arc` snapshot; a reload never mutates a taxonomy
/// someone is still holding.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyHandle {
    inner: Arc<RwLock<Arc<Taxonomy>>>,
}

impl TaxonomyHandle {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(taxonomy))),
        }
    }

    pub fn current(&self) -> Arc<Taxonomy> {
        self.inner
            .read()
            .expect("taxonomy lock poisoned")
            .clone()
    }

    /// Replace the mapping. Validation happens before the swap, so a bad
    /// configuration leaves the previous mapping in place.
    pub fn reload(&self, mappings: &[CategoryMapping]) -> Result<usize> {
        let taxonomy = Taxonomy::new(mappings)?;
        let count = taxonomy.len();
        *self.inner.write().expect("taxonomy lock poisoned") = Arc::new(taxonomy);
        tracing::info!(categories = count, "Taxonomy reloaded");
        Ok(count)
    }
}
