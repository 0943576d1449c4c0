//! Outbreak surveillance.
//!
//! Disease cases are grouped by (disease, location) over a trailing window.
//! Groups whose case count reaches the threshold become outbreak candidates,
//! and each candidate is declared as an outbreak unless an active one already
//! exists for its key. The storage layer makes that check-and-create atomic.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::SurveillanceError;
use crate::model::{
    AnalysisResult, CaseStatus, DiseaseCase, NewDiseaseCase, Outbreak, OutbreakCandidate,
    OutbreakStatistics, OutbreakStatusRequest, Severity, UNKNOWN_SYNDROME,
};
use crate::rules::RuleConfig;
use crate::storage::{OutbreakInsert, Storage};

/// Longest window a detection run may scan.
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Threshold and window for a detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionParams {
    /// Minimum cases in a group to declare an outbreak.
    pub threshold: u32,

    /// Length of the trailing window in days.
    pub time_window_days: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            threshold: 3,
            time_window_days: 7,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), SurveillanceError> {
        if self.threshold < 1 {
            return Err(SurveillanceError::InvalidParameter {
                field: "threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.time_window_days) {
            return Err(SurveillanceError::InvalidParameter {
                field: "time_window_days",
                reason: format!("must be between 1 and {MAX_WINDOW_DAYS}"),
            });
        }
        Ok(())
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.time_window_days))
    }
}

/// Severity of an outbreak from its case and emergency counts.
///
/// # Thresholds
///
/// - `critical`: 20+ cases or 5+ emergencies
/// - `high`: 10+ cases or 3+ emergencies
/// - `medium`: 5+ cases
/// - `low`: otherwise
pub fn classify_severity(case_count: usize, emergency_cases: usize) -> Severity {
    if case_count >= 20 || emergency_cases >= 5 {
        Severity::Critical
    } else if case_count >= 10 || emergency_cases >= 3 {
        Severity::High
    } else if case_count >= 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Derive the surveillance case for an analysis.
///
/// No case is logged for an unknown syndrome or when the submission carried
/// no location.
pub fn case_from_analysis(
    result: &AnalysisResult,
    location: Option<&str>,
    rules: &RuleConfig,
) -> Option<NewDiseaseCase> {
    let location = location.map(str::trim).filter(|l| !l.is_empty())?;
    if result.predicted_syndrome == UNKNOWN_SYNDROME {
        return None;
    }

    let emergency_syndrome = rules
        .emergency_syndromes
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&result.predicted_syndrome));

    Some(NewDiseaseCase {
        analysis_id: None,
        disease_name: result.predicted_syndrome.clone(),
        confidence: result.confidence,
        severity: result.risk_level,
        is_emergency: emergency_syndrome || result.risk_score >= rules.emergency_risk_score,
        location: location.to_string(),
        case_date: result.timestamp,
        status: CaseStatus::Detected,
    })
}

/// Check a manually logged case before it is stored.
pub fn validate_new_case(case: &NewDiseaseCase) -> Result<(), SurveillanceError> {
    if case.disease_name.trim().is_empty() {
        return Err(SurveillanceError::InvalidParameter {
            field: "disease_name",
            reason: "must not be blank".to_string(),
        });
    }
    if case.location.trim().is_empty() {
        return Err(SurveillanceError::InvalidParameter {
            field: "location",
            reason: "must not be blank".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&case.confidence) {
        return Err(SurveillanceError::InvalidParameter {
            field: "confidence",
            reason: "must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

/// Totals over a set of cases. `None` for an empty set.
pub fn compute_statistics<'a>(
    cases: impl IntoIterator<Item = &'a DiseaseCase>,
) -> Option<OutbreakStatistics> {
    let mut total = 0usize;
    let mut emergency_cases = 0usize;
    let mut critical_cases = 0usize;
    let mut confidence_sum = 0.0;
    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<DateTime<Utc>> = None;

    for case in cases {
        total += 1;
        if case.is_emergency {
            emergency_cases += 1;
        }
        if case.severity == Severity::Critical {
            critical_cases += 1;
        }
        confidence_sum += case.confidence;
        first = Some(first.map_or(case.case_date, |d| d.min(case.case_date)));
        last = Some(last.map_or(case.case_date, |d| d.max(case.case_date)));
    }

    let (start_date, last_case_date) = (first?, last?);
    Some(OutbreakStatistics {
        total_cases: total,
        emergency_cases,
        critical_cases,
        average_confidence: confidence_sum / total as f64,
        start_date,
        last_case_date,
        severity: classify_severity(total, emergency_cases),
    })
}

/// Group cases into outbreak candidates.
///
/// Only cases with a detectable status dated within `[now - window, now]`
/// count. Candidates are ordered by case count, largest first, then by
/// disease and location.
pub fn group_cases(
    cases: &[DiseaseCase],
    params: &DetectionParams,
    now: DateTime<Utc>,
) -> Vec<OutbreakCandidate> {
    let start = params.window_start(now);

    let mut groups: BTreeMap<(&str, &str), Vec<&DiseaseCase>> = BTreeMap::new();
    for case in cases.iter().filter(|c| {
        c.status.counts_for_detection() && c.case_date >= start && c.case_date <= now
    }) {
        groups
            .entry((case.disease_name.as_str(), case.location.as_str()))
            .or_default()
            .push(case);
    }

    let threshold = params.threshold as usize;
    let mut candidates: Vec<OutbreakCandidate> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= threshold)
        .filter_map(|((disease, location), members)| {
            let stats = compute_statistics(members.iter().copied())?;
            Some(OutbreakCandidate {
                disease_name: disease.to_string(),
                location: location.to_string(),
                case_count: stats.total_cases,
                emergency_cases: stats.emergency_cases,
                critical_cases: stats.critical_cases,
                average_confidence: stats.average_confidence,
                first_case_date: stats.start_date,
                last_case_date: stats.last_case_date,
                severity: stats.severity,
                case_ids: members.iter().map(|c| c.id).collect(),
            })
        })
        .collect();

    // Stable sort keeps the (disease, location) order among equal counts.
    candidates.sort_by(|a, b| b.case_count.cmp(&a.case_count));
    candidates
}

/// Result of a detection run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub generated_at: DateTime<Utc>,
    pub threshold: u32,
    pub time_window_days: u32,

    /// Cases inside the window that were considered.
    pub scanned_cases: usize,

    /// Every group that crossed the threshold.
    pub candidates: Vec<OutbreakCandidate>,

    /// Outbreaks declared by this run.
    pub created: Vec<Outbreak>,

    /// Active outbreaks that already covered a candidate.
    pub existing_outbreak_ids: Vec<i64>,
}

/// Scan recent cases and declare outbreaks for new candidates.
///
/// A storage failure aborts the run with a retryable error; no partial report
/// is returned. Outbreaks declared before the failure stay in place and are
/// reported as existing on the next run.
pub async fn detect_outbreaks(
    storage: &Storage,
    params: DetectionParams,
    now: DateTime<Utc>,
) -> Result<DetectionReport, SurveillanceError> {
    params.validate()?;

    let cases = storage
        .detectable_cases_between(params.window_start(now), now)
        .await?;
    let candidates = group_cases(&cases, &params, now);

    let mut created = Vec::new();
    let mut existing_outbreak_ids = Vec::new();

    for candidate in &candidates {
        match storage
            .create_outbreak_if_absent(candidate, params.threshold, params.time_window_days, now)
            .await?
        {
            OutbreakInsert::Created(outbreak) => {
                warn!(
                    outbreak_id = outbreak.id,
                    disease = %outbreak.disease_name,
                    location = %outbreak.location,
                    cases = outbreak.total_cases,
                    severity = %outbreak.severity,
                    "{}",
                    outbreak_alert_message(&outbreak)
                );
                created.push(outbreak);
            }
            OutbreakInsert::Existing(id) => existing_outbreak_ids.push(id),
        }
    }

    info!(
        scanned_cases = cases.len(),
        candidates = candidates.len(),
        created = created.len(),
        existing = existing_outbreak_ids.len(),
        threshold = params.threshold,
        window_days = params.time_window_days,
        "Outbreak detection completed"
    );

    Ok(DetectionReport {
        generated_at: now,
        threshold: params.threshold,
        time_window_days: params.time_window_days,
        scanned_cases: cases.len(),
        candidates,
        created,
        existing_outbreak_ids,
    })
}

/// Recompute an outbreak's totals.
///
/// While the outbreak is active, matching cases dated on or after its start
/// that are not yet part of any outbreak are first added to the affected set.
/// Totals are then computed from the affected set, ignoring cases marked
/// false positive.
pub async fn refresh_statistics(
    storage: &Storage,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Outbreak, SurveillanceError> {
    let outbreak = storage
        .get_outbreak(id)
        .await?
        .ok_or(SurveillanceError::OutbreakNotFound(id))?;

    if outbreak.status.is_active() {
        let attached = storage
            .attach_unlinked_cases(
                id,
                &outbreak.disease_name,
                &outbreak.location,
                outbreak.start_date,
                now,
            )
            .await?;
        if !attached.is_empty() {
            info!(outbreak_id = id, attached = attached.len(), "Attached new cases to outbreak");
        }
    }

    let cases = storage.outbreak_cases(id).await?;
    let stats = compute_statistics(
        cases
            .iter()
            .filter(|c| c.status != CaseStatus::FalsePositive),
    )
    .unwrap_or(OutbreakStatistics {
        total_cases: 0,
        emergency_cases: 0,
        critical_cases: 0,
        average_confidence: 0.0,
        start_date: outbreak.start_date,
        last_case_date: outbreak.last_case_date,
        severity: Severity::Low,
    });

    storage.write_outbreak_statistics(id, &stats, now).await?;

    storage
        .get_outbreak(id)
        .await?
        .ok_or(SurveillanceError::OutbreakNotFound(id))
}

/// Apply a manual status change, appending it to the action log.
pub async fn change_outbreak_status(
    storage: &Storage,
    id: i64,
    request: &OutbreakStatusRequest,
    now: DateTime<Utc>,
) -> Result<Outbreak, SurveillanceError> {
    let outbreak = storage
        .get_outbreak(id)
        .await?
        .ok_or(SurveillanceError::OutbreakNotFound(id))?;

    if !outbreak.status.can_transition_to(request.status) {
        return Err(SurveillanceError::InvalidTransition {
            from: outbreak.status,
            to: request.status,
        });
    }

    let action = match request.note.as_deref().map(str::trim) {
        Some(note) if !note.is_empty() => format!(
            "Status changed from {} to {}: {}",
            outbreak.status, request.status, note
        ),
        _ => format!("Status changed from {} to {}", outbreak.status, request.status),
    };

    let moved = storage
        .update_outbreak_status(
            id,
            outbreak.status,
            request.status,
            &action,
            request.performed_by.as_deref(),
            now,
        )
        .await?;

    if !moved {
        // Someone else changed the status between our read and write.
        let current = storage
            .get_outbreak(id)
            .await?
            .ok_or(SurveillanceError::OutbreakNotFound(id))?;
        return Err(SurveillanceError::InvalidTransition {
            from: current.status,
            to: request.status,
        });
    }

    info!(
        outbreak_id = id,
        from = %outbreak.status,
        to = %request.status,
        "Outbreak status changed"
    );

    storage
        .get_outbreak(id)
        .await?
        .ok_or(SurveillanceError::OutbreakNotFound(id))
}

/// Append a manual entry to an outbreak's action log.
pub async fn record_outbreak_action(
    storage: &Storage,
    id: i64,
    action: &str,
    performed_by: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Outbreak, SurveillanceError> {
    let action = action.trim();
    if action.is_empty() {
        return Err(SurveillanceError::InvalidParameter {
            field: "action",
            reason: "must not be blank".to_string(),
        });
    }

    if storage.get_outbreak(id).await?.is_none() {
        return Err(SurveillanceError::OutbreakNotFound(id));
    }

    storage
        .append_outbreak_action(id, action, performed_by, now)
        .await?;

    storage
        .get_outbreak(id)
        .await?
        .ok_or(SurveillanceError::OutbreakNotFound(id))
}

/// Run detection periodically in the background.
///
/// Runs on its own task so submissions never wait on a scan. Failures are
/// logged and the next tick tries again.
pub fn spawn_detection_poller(
    storage: Storage,
    params: DetectionParams,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match detect_outbreaks(&storage, params, Utc::now()).await {
                Ok(report) => info!(
                    created = report.created.len(),
                    candidates = report.candidates.len(),
                    "Scheduled outbreak detection finished"
                ),
                Err(e) => warn!(
                    error = %e,
                    retryable = e.is_retryable(),
                    "Scheduled outbreak detection failed"
                ),
            }
        }
    })
}

/// Generate a human-readable alert for an outbreak.
pub fn outbreak_alert_message(outbreak: &Outbreak) -> String {
    match outbreak.severity {
        Severity::Critical => format!(
            "CRITICAL: {} outbreak at '{}'. {} cases ({} emergencies) since {}.",
            outbreak.disease_name,
            outbreak.location,
            outbreak.total_cases,
            outbreak.emergency_cases,
            outbreak.start_date.format("%Y-%m-%d")
        ),
        Severity::High => format!(
            "WARNING: {} outbreak at '{}'. {} cases ({} emergencies) since {}.",
            outbreak.disease_name,
            outbreak.location,
            outbreak.total_cases,
            outbreak.emergency_cases,
            outbreak.start_date.format("%Y-%m-%d")
        ),
        Severity::Medium | Severity::Low => format!(
            "Possible {} outbreak at '{}': {} cases within {} days (threshold {}).",
            outbreak.disease_name,
            outbreak.location,
            outbreak.total_cases,
            outbreak.time_window_days,
            outbreak.threshold
        ),
    }
}
