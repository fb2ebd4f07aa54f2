//! Heuristic separating cosmetic content edits from substantive ones.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Tunable constants of the significance heuristic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SignificanceThresholds {
    /// Normalized length ratios below this are significant.
    #[serde(alias = "cosmetic_length_min")]
    pub length_ratio_min: f64,
    /// Normalized length ratios above this are significant.
    #[serde(alias = "cosmetic_length_max")]
    pub length_ratio_max: f64,
    /// Word-set symmetric difference over union above this is significant.
    #[serde(alias = "word_change_threshold")]
    pub word_change_ratio: f64,
}

impl Default for SignificanceThresholds {
    fn default() -> Self {
        Self {
            length_ratio_min: 0.8,
            length_ratio_max: 1.2,
            word_change_ratio: 0.25,
        }
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_significant_change(old: &str, new: &str, thresholds: &SignificanceThresholds) -> bool {
    let old = normalize(old);
    let new = normalize(new);

    if old == new {
        return false;
    }

    let old_len = old.chars().count();
    let new_len = new.chars().count();
    if old_len == 0 || new_len == 0 {
        return true;
    }

    let ratio = new_len as f64 / old_len as f64;
    if ratio < thresholds.length_ratio_min || ratio > thresholds.length_ratio_max {
        return true;
    }

    let old_words: HashSet<&str> = old.split(' ').collect();
    let new_words: HashSet<&str> = new.split(' ').collect();
    let union = old_words.union(&new_words).count();
    if union == 0 {
        return false;
    }
    let changed = old_words.symmetric_difference(&new_words).count();

    changed as f64 / union as f64 > thresholds.word_change_ratio
}
