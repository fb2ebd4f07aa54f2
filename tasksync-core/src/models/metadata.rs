use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata fields whose values are classified by the enrichment pipeline and
/// carry their own classification timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassifiedField {
    RecommendedCategory,
    TimeEstimateMinutes,
    PriorityScore,
}

impl ClassifiedField {
    pub const ALL: [ClassifiedField; 3] = [
        Self::RecommendedCategory,
        Self::TimeEstimateMinutes,
        Self::PriorityScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecommendedCategory => "recommended_category",
            Self::TimeEstimateMinutes => "time_estimate_minutes",
            Self::PriorityScore => "priority_score",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "recommended_category" => Some(Self::RecommendedCategory),
            "time_estimate_minutes" => Some(Self::TimeEstimateMinutes),
            "priority_score" => Some(Self::PriorityScore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Ai,
    Manual,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ai" => Some(Self::Ai),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A single `(value, classified_at)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub value: serde_json::Value,
    pub classified_at: Option<DateTime<Utc>>,
}

impl Classification {
    /// A value only counts when it is non-null and timestamped.
    pub fn is_present(&self) -> bool {
        !self.value.is_null() && self.classified_at.is_some()
    }
}

/// Any field writable through `Database::save_field_metadata`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    RecommendedCategory,
    TimeEstimateMinutes,
    PriorityScore,
    RecommendationApplied,
    ClassificationSource,
}

impl MetadataField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecommendedCategory => "recommended_category",
            Self::TimeEstimateMinutes => "time_estimate_minutes",
            Self::PriorityScore => "priority_score",
            Self::RecommendationApplied => "recommendation_applied",
            Self::ClassificationSource => "classification_source",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "recommended_category" => Some(Self::RecommendedCategory),
            "time_estimate_minutes" => Some(Self::TimeEstimateMinutes),
            "priority_score" => Some(Self::PriorityScore),
            "recommendation_applied" => Some(Self::RecommendationApplied),
            "classification_source" => Some(Self::ClassificationSource),
            _ => None,
        }
    }

    pub fn classified(&self) -> Option<ClassifiedField> {
        match self {
            Self::RecommendedCategory => Some(ClassifiedField::RecommendedCategory),
            Self::TimeEstimateMinutes => Some(ClassifiedField::TimeEstimateMinutes),
            Self::PriorityScore => Some(ClassifiedField::PriorityScore),
            Self::RecommendationApplied | Self::ClassificationSource => None,
        }
    }
}

impl From<ClassifiedField> for MetadataField {
    fn from(field: ClassifiedField) -> Self {
        match field {
            ClassifiedField::RecommendedCategory => Self::RecommendedCategory,
            ClassifiedField::TimeEstimateMinutes => Self::TimeEstimateMinutes,
            ClassifiedField::PriorityScore => Self::PriorityScore,
        }
    }
}

/// Classification layer on top of a task. One row per task, created on the
/// first enrichment write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskMetadata {
    pub task_id: String,
    /// Applied category; may differ from the recommendation.
    pub category: Option<String>,
    pub time_estimate: Option<String>,
    pub size: Option<String>,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub needs_supplies: bool,
    pub can_delegate: bool,
    pub energy_level: Option<String>,
    pub classification_source: Option<ClassificationSource>,
    pub recommendation_applied: bool,
    pub fields: BTreeMap<ClassifiedField, Classification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskMetadata {
    pub fn new(task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            category: None,
            time_estimate: None,
            size: None,
            ai_confidence: None,
            ai_reasoning: None,
            needs_supplies: false,
            can_delegate: false,
            energy_level: None,
            classification_source: None,
            recommendation_applied: false,
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style setter, mostly useful when assembling fixtures.
    pub fn with_classification(
        mut self,
        field: ClassifiedField,
        value: impl Into<serde_json::Value>,
        classified_at: DateTime<Utc>,
    ) -> Self {
        self.fields.insert(
            field,
            Classification {
                value: value.into(),
                classified_at: Some(classified_at),
            },
        );
        self
    }

    pub fn classification(&self, field: ClassifiedField) -> Option<&Classification> {
        self.fields.get(&field).filter(|c| c.is_present())
    }

    pub fn classified_at(&self, field: ClassifiedField) -> Option<DateTime<Utc>> {
        self.classification(field).and_then(|c| c.classified_at)
    }

    pub fn recommended_category(&self) -> Option<&str> {
        self.classification(ClassifiedField::RecommendedCategory)
            .and_then(|c| c.value.as_str())
    }

    pub fn category_classified_at(&self) -> Option<DateTime<Utc>> {
        self.classified_at(ClassifiedField::RecommendedCategory)
    }

    pub fn time_estimate_minutes(&self) -> Option<i64> {
        self.classification(ClassifiedField::TimeEstimateMinutes)
            .and_then(|c| c.value.as_i64())
    }

    pub fn priority_score(&self) -> Option<f64> {
        self.classification(ClassifiedField::PriorityScore)
            .and_then(|c| c.value.as_f64())
    }
}

/// Descriptive enrichment output that is not subject to reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDetails {
    pub category: Option<String>,
    pub time_estimate: Option<String>,
    pub size: Option<String>,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub needs_supplies: Option<bool>,
    pub can_delegate: Option<bool>,
    pub energy_level: Option<String>,
}
