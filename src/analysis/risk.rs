//! Additive risk scoring.

use super::features::FeatureVector;
use crate::rules::RuleConfig;

/// Compute the risk score for a feature vector.
///
/// `base_risk + Σ symptom weights + vital penalties`, clamped to [0, 1].
/// Symptoms are already deduplicated by the extractor, so repeating a name in
/// a report never raises the score. Unknown names contribute nothing.
pub fn score_risk(features: &FeatureVector, rules: &RuleConfig) -> f64 {
    let symptom_total: f64 = features
        .symptoms
        .keys()
        .filter_map(|name| rules.symptom_weights.get(name))
        .sum();

    let penalties = &rules.vital_penalties;
    let vitals = &features.vitals;
    let mut vital_total = 0.0;
    if vitals.temperature > penalties.temperature_above {
        vital_total += penalties.temperature_penalty;
    }
    if vitals.heart_rate > penalties.heart_rate_above {
        vital_total += penalties.heart_rate_penalty;
    }
    if vitals.oxygen_saturation < penalties.oxygen_below {
        vital_total += penalties.oxygen_penalty;
    }

    (rules.base_risk + symptom_total + vital_total).clamp(0.0, 1.0)
}
