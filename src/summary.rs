//! Surveillance summary over a span of disease cases.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{CaseStatus, DiseaseCase, Severity};

/// Location with its case count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationCaseCount {
    pub location: String,
    pub count: usize,
}

/// Counts over a set of cases.
#[derive(Debug, Clone, Serialize)]
pub struct SurveillanceSummary {
    pub generated_at: DateTime<Utc>,

    /// Days of history covered.
    pub days: u32,

    pub total_cases: usize,
    pub emergency_count: usize,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,

    /// Cases already part of an outbreak.
    pub outbreak_related_count: usize,

    /// Cases ruled out on review. Not included in the other counts.
    pub false_positive_count: usize,

    /// Cases by disease name.
    pub by_disease: HashMap<String, usize>,

    /// Locations with the most cases, at most 10.
    pub top_locations: Vec<LocationCaseCount>,

    /// Outbreaks currently detected, confirmed or contained.
    pub active_outbreaks: usize,
}

impl SurveillanceSummary {
    /// Compute a summary from a list of cases.
    pub fn from_cases(
        cases: &[DiseaseCase],
        days: u32,
        active_outbreaks: usize,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut by_disease: HashMap<String, usize> = HashMap::new();
        let mut by_location: HashMap<String, usize> = HashMap::new();

        let mut total_cases = 0;
        let mut emergency_count = 0;
        let mut critical_count = 0;
        let mut high_count = 0;
        let mut medium_count = 0;
        let mut low_count = 0;
        let mut outbreak_related_count = 0;
        let mut false_positive_count = 0;

        for case in cases {
            if case.status == CaseStatus::FalsePositive {
                false_positive_count += 1;
                continue;
            }

            total_cases += 1;
            match case.severity {
                Severity::Critical => critical_count += 1,
                Severity::High => high_count += 1,
                Severity::Medium => medium_count += 1,
                Severity::Low => low_count += 1,
            }
            if case.is_emergency {
                emergency_count += 1;
            }
            if case.is_outbreak_related {
                outbreak_related_count += 1;
            }

            *by_disease.entry(case.disease_name.clone()).or_insert(0) += 1;
            *by_location.entry(case.location.clone()).or_insert(0) += 1;
        }

        // Top 10 locations; ties broken by name so output is stable.
        let mut location_counts: Vec<_> = by_location.into_iter().collect();
        location_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top_locations = location_counts
            .into_iter()
            .take(10)
            .map(|(location, count)| LocationCaseCount { location, count })
            .collect();

        Self {
            generated_at,
            days,
            total_cases,
            emergency_count,
            critical_count,
            high_count,
            medium_count,
            low_count,
            outbreak_related_count,
            false_positive_count,
            by_disease,
            top_locations,
            active_outbreaks,
        }
    }
}
