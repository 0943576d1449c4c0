//! Syndrome classification by trigger matching.
//!
//! Categories are evaluated in the order they appear in
//! [`RuleConfig::syndromes`]; the first one with enough triggers present
//! wins, even when a later category would match more triggers.

use std::collections::BTreeSet;

use crate::model::UNKNOWN_SYNDROME;
use crate::rules::RuleConfig;

/// Result of classifying a symptom set.
#[derive(Debug, Clone, PartialEq)]
pub struct SyndromeMatch {
    pub syndrome: String,

    /// Number of the winning category's triggers that were present. Zero for unknown.
    pub matched_triggers: usize,

    pub confidence: f64,
}

/// Classify a set of normalized symptom names.
pub fn classify_syndrome(symptoms: &BTreeSet<String>, rules: &RuleConfig) -> SyndromeMatch {
    for rule in &rules.syndromes {
        let matched = rule
            .triggers
            .iter()
            .filter(|trigger| symptoms.contains(trigger.as_str()))
            .count();

        if matched >= rule.min_matches {
            let coverage = matched as f64 / rule.triggers.len() as f64;
            return SyndromeMatch {
                syndrome: rule.name.clone(),
                matched_triggers: matched,
                confidence: (0.5 + 0.5 * coverage).clamp(0.0, 1.0),
            };
        }
    }

    // No category matched: confidence reflects how much of the report the
    // rules recognise at all.
    let known = rules.known_symptoms();
    let recognized = symptoms.iter().filter(|s| known.contains(*s)).count();
    let confidence = if symptoms.is_empty() {
        0.0
    } else {
        0.5 * recognized as f64 / symptoms.len() as f64
    };

    SyndromeMatch {
        syndrome: UNKNOWN_SYNDROME.to_string(),
        matched_triggers: 0,
        confidence: confidence.clamp(0.0, 1.0),
    }
}
