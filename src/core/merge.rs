use crate::core::extraction::{DEFAULT_PROGRAM_NAME, DEFAULT_PURPOSE};
use crate::domain::model::BusinessLogic;
use std::collections::HashSet;

pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Jaccard similarity of the lower-cased word sets of `a` and `b`.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }

    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

/// Folds per-chunk results into one record, dropping near-duplicates.
pub fn merge_chunk_results(results: Vec<BusinessLogic>) -> Option<BusinessLogic> {
    let mut results = results.into_iter();
    let mut merged = results.next()?;

    for result in results {
        if merged.program_name == DEFAULT_PROGRAM_NAME && result.program_name != DEFAULT_PROGRAM_NAME {
            merged.program_name = result.program_name.clone();
        }
        if merged.program_purpose == DEFAULT_PURPOSE && result.program_purpose != DEFAULT_PURPOSE {
            merged.program_purpose = result.program_purpose.clone();
        }

        for rule in result.core_rules {
            let duplicate = merged.core_rules.iter().any(|existing| {
                text_similarity(&rule.description, &existing.description) > SIMILARITY_THRESHOLD
            });
            if !duplicate {
                merged.core_rules.push(rule);
            }
        }

        for validation in result.validations {
            if !merged.validations.iter().any(|v| v.field == validation.field) {
                merged.validations.push(validation);
            }
        }

        for case in result.special_cases {
            let duplicate = merged.special_cases.iter().any(|existing| {
                text_similarity(&case.condition, &existing.condition) > SIMILARITY_THRESHOLD
            });
            if !duplicate {
                merged.special_cases.push(case);
            }
        }

        for point in result.integration_points {
            if !merged.integration_points.iter().any(|p| p.name == point.name) {
                merged.integration_points.push(point);
            }
        }

        if let Some(notes) = result.additional_notes.filter(|n| !n.is_empty()) {
            merged.append_note(&notes);
        }
    }

    // 每段都從 RULE_1 起算，合併後重新編號
    for (i, rule) in merged.core_rules.iter_mut().enumerate() {
        rule.rule_id = format!("RULE_{}", i + 1);
    }

    Some(merged)
}
