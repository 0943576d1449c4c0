//! Advisory text for an analysis.

use crate::model::SymptomReport;
use crate::rules::RuleConfig;

/// Build the ordered advice list.
///
/// 1. The block for the risk tier the score falls into.
/// 2. The syndrome block (exact case-insensitive dictionary match) or the generic block.
/// 3. A temperature line if any symptom mentions fever or temperature.
/// 4. Cough care lines if any symptom mentions cough.
pub fn recommend(
    risk_score: f64,
    syndrome: &str,
    report: &SymptomReport,
    rules: &RuleConfig,
) -> Vec<String> {
    let mut recommendations = rules.tier_for(risk_score).advice.clone();

    let syndrome_block = rules
        .syndrome_advice
        .get(&syndrome.to_lowercase())
        .unwrap_or(&rules.generic_advice);
    recommendations.extend(syndrome_block.iter().cloned());

    let names: Vec<String> = report
        .symptoms
        .iter()
        .map(|s| s.name.to_lowercase())
        .collect();

    if names
        .iter()
        .any(|n| n.contains("fever") || n.contains("temperature"))
    {
        recommendations.push(rules.temperature_advice.clone());
    }

    if names.iter().any(|n| n.contains("cough")) {
        recommendations.extend(rules.cough_advice.iter().cloned());
    }

    recommendations
}
