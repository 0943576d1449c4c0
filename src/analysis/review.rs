//! Review-flagging policy.
//!
//! A report is flagged for doctor review when any predicate holds. Every
//! predicate is evaluated so the reasons list is complete.

use serde::Serialize;

use super::features::FeatureVector;
use crate::model::SymptomReport;
use crate::rules::RuleConfig;

/// Why a report was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    HighRiskScore,
    LowConfidence,
    MultipleSevereSymptoms,
    TravelOrExposure,
    HighTemperature,
    ElevatedHeartRate,
    LowOxygenSaturation,
}

impl ReviewReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewReason::HighRiskScore => "high_risk_score",
            ReviewReason::LowConfidence => "low_confidence",
            ReviewReason::MultipleSevereSymptoms => "multiple_severe_symptoms",
            ReviewReason::TravelOrExposure => "travel_or_exposure",
            ReviewReason::HighTemperature => "high_temperature",
            ReviewReason::ElevatedHeartRate => "elevated_heart_rate",
            ReviewReason::LowOxygenSaturation => "low_oxygen_saturation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    pub flagged: bool,
    pub reasons: Vec<ReviewReason>,
}

/// Decide whether a report needs manual review.
///
/// Vital-sign predicates look at the submitted values only; imputed
/// defaults never flag a report.
pub fn review(
    risk_score: f64,
    confidence: f64,
    report: &SymptomReport,
    features: &FeatureVector,
    rules: &RuleConfig,
) -> ReviewDecision {
    let t = &rules.review;
    let vitals = report.vital_signs.clone().unwrap_or_default();

    let checks = [
        (risk_score >= t.risk_score, ReviewReason::HighRiskScore),
        (confidence < t.min_confidence, ReviewReason::LowConfidence),
        (
            features.count_at_least(t.severe_symptom) >= t.severe_symptom_count,
            ReviewReason::MultipleSevereSymptoms,
        ),
        (
            report.recent_travel || report.recent_exposure,
            ReviewReason::TravelOrExposure,
        ),
        (
            vitals.temperature.is_some_and(|v| v > t.temperature_above),
            ReviewReason::HighTemperature,
        ),
        (
            vitals.heart_rate.is_some_and(|v| v > t.heart_rate_above),
            ReviewReason::ElevatedHeartRate,
        ),
        (
            vitals.oxygen_saturation.is_some_and(|v| v < t.oxygen_below),
            ReviewReason::LowOxygenSaturation,
        ),
    ];

    let reasons: Vec<ReviewReason> = checks
        .into_iter()
        .filter_map(|(fired, reason)| fired.then_some(reason))
        .collect();

    ReviewDecision {
        flagged: !reasons.is_empty(),
        reasons,
    }
}
