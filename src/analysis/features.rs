//! Feature extraction.
//!
//! Turns a validated [`SymptomReport`] into normalized numeric features.
//! Missing vital signs are imputed from [`crate::rules::VitalDefaults`]
//! before normalization, so every feature is always defined.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::SymptomReport;
use crate::rules::RuleConfig;

/// Symptom count at which the count feature saturates.
const SYMPTOM_COUNT_CAP: f64 = 20.0;

/// Normalize a free-form symptom name.
///
/// Lower-cases, trims and joins words with `_`, so "Chest Pain",
/// "chest-pain" and "chest_pain" all become `chest_pain`.
pub fn normalize_symptom_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Raw vital signs after imputation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedVitals {
    pub temperature: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub heart_rate: f64,
    pub respiratory_rate: f64,
    pub oxygen_saturation: f64,
}

impl ResolvedVitals {
    fn normalized(&self) -> NormalizedVitals {
        NormalizedVitals {
            temperature: (self.temperature - 95.0) / 10.0,
            systolic: (self.systolic - 80.0) / 100.0,
            diastolic: (self.diastolic - 50.0) / 80.0,
            heart_rate: (self.heart_rate - 40.0) / 120.0,
            respiratory_rate: (self.respiratory_rate - 8.0) / 32.0,
            oxygen_saturation: (self.oxygen_saturation - 70.0) / 30.0,
        }
    }
}

/// Vital signs scaled to roughly [0, 1] over their clinical range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedVitals {
    pub temperature: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub heart_rate: f64,
    pub respiratory_rate: f64,
    pub oxygen_saturation: f64,
}

/// Features derived from one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Deduplicated normalized symptom names with their highest reported severity.
    pub symptoms: BTreeMap<String, i32>,

    /// Presence flag for every symptom the rules know about.
    pub symptom_presence: BTreeMap<String, bool>,

    /// Mean severity divided by 10.
    pub average_severity: f64,

    /// Distinct symptom count divided by 20, capped at 1.
    pub symptom_count: f64,

    pub vitals: ResolvedVitals,
    pub normalized_vitals: NormalizedVitals,

    pub recent_travel: f64,
    pub recent_exposure: f64,
}

impl FeatureVector {
    pub fn symptom_names(&self) -> BTreeSet<String> {
        self.symptoms.keys().cloned().collect()
    }

    /// Number of distinct symptoms whose severity is at least `threshold`.
    pub fn count_at_least(&self, threshold: i32) -> usize {
        self.symptoms.values().filter(|&&s| s >= threshold).count()
    }

    /// Flatten into a numeric vector.
    ///
    /// Order: presence flags (alphabetical by name), average severity,
    /// symptom count, the six normalized vitals, travel, exposure.
    pub fn to_vec(&self) -> Vec<f64> {
        let v = &self.normalized_vitals;
        self.symptom_presence
            .values()
            .map(|&present| if present { 1.0 } else { 0.0 })
            .chain([
                self.average_severity,
                self.symptom_count,
                v.temperature,
                v.systolic,
                v.diastolic,
                v.heart_rate,
                v.respiratory_rate,
                v.oxygen_saturation,
                self.recent_travel,
                self.recent_exposure,
            ])
            .collect()
    }
}

/// Extract features from a report.
///
/// The report is expected to have passed [`super::validate::validate_report`].
pub fn extract_features(report: &SymptomReport, rules: &RuleConfig) -> FeatureVector {
    let mut symptoms: BTreeMap<String, i32> = BTreeMap::new();
    for symptom in &report.symptoms {
        let entry = symptoms
            .entry(normalize_symptom_name(&symptom.name))
            .or_insert(symptom.severity);
        *entry = (*entry).max(symptom.severity);
    }

    let symptom_presence = rules
        .known_symptoms()
        .into_iter()
        .map(|name| {
            let present = symptoms.contains_key(&name);
            (name, present)
        })
        .collect();

    let count = symptoms.len();
    let average_severity = if count == 0 {
        0.0
    } else {
        symptoms.values().map(|&s| f64::from(s)).sum::<f64>() / count as f64 / 10.0
    };
    let symptom_count = (count as f64 / SYMPTOM_COUNT_CAP).min(1.0);

    let defaults = &rules.vital_defaults;
    let reported = report.vital_signs.clone().unwrap_or_default();
    let vitals = ResolvedVitals {
        temperature: reported.temperature.unwrap_or(defaults.temperature),
        systolic: reported
            .blood_pressure
            .map_or(defaults.systolic, |bp| bp.systolic),
        diastolic: reported
            .blood_pressure
            .map_or(defaults.diastolic, |bp| bp.diastolic),
        heart_rate: reported.heart_rate.unwrap_or(defaults.heart_rate),
        respiratory_rate: reported
            .respiratory_rate
            .unwrap_or(defaults.respiratory_rate),
        oxygen_saturation: reported
            .oxygen_saturation
            .unwrap_or(defaults.oxygen_saturation),
    };

    FeatureVector {
        symptoms,
        symptom_presence,
        average_severity,
        symptom_count,
        normalized_vitals: vitals.normalized(),
        vitals,
        recent_travel: if report.recent_travel { 1.0 } else { 0.0 },
        recent_exposure: if report.recent_exposure { 1.0 } else { 0.0 },
    }
}
