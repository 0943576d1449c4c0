//! Data models for CareWatch.
//!
//! Three families of types live here:
//!
//! - **Submissions**: [`SymptomReport`] and its parts, as received from the portal.
//! - **Analysis output**: [`AnalysisResult`] and the persisted [`AnalysisRecord`].
//! - **Surveillance**: [`DiseaseCase`], [`OutbreakCandidate`] and [`Outbreak`].
//!
//! Everything here is plain data. The rules that produce and transform these
//! values live in [`crate::analysis`] and [`crate::surveillance`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Syndrome label used when no category matches.
pub const UNKNOWN_SYNDROME: &str = "unknown";

/// A single reported symptom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symptom {
    /// Free-form symptom name such as "fever" or "Chest Pain".
    pub name: String,

    /// Patient-rated severity, 1 (barely noticeable) to 10 (worst imaginable).
    pub severity: i32,

    /// How long the symptom has been present.
    pub duration: SymptomDuration,
}

/// How long a symptom has lasted.
///
/// The unit is kept as submitted and parsed during validation so that a bad
/// unit is reported against the field that carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomDuration {
    pub value: f64,
    pub unit: String,
}

/// Accepted duration units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl FromStr for DurationUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutes" => Ok(DurationUnit::Minutes),
            "hours" => Ok(DurationUnit::Hours),
            "days" => Ok(DurationUnit::Days),
            "weeks" => Ok(DurationUnit::Weeks),
            _ => Err(()),
        }
    }
}

/// Blood pressure reading in mmHg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

/// Optional vital signs attached to a report.
///
/// Any member may be missing; the feature extractor imputes
/// physiologic-normal values for whatever is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    /// Body temperature in °F.
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Beats per minute.
    #[serde(default)]
    pub heart_rate: Option<f64>,

    /// Breaths per minute.
    #[serde(default)]
    pub respiratory_rate: Option<f64>,

    #[serde(default)]
    pub blood_pressure: Option<BloodPressure>,

    /// Peripheral oxygen saturation in percent.
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
}

/// A patient-submitted symptom report.
///
/// Created by a submission and consumed once by the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomReport {
    pub symptoms: Vec<Symptom>,

    #[serde(default)]
    pub vital_signs: Option<VitalSigns>,

    #[serde(default)]
    pub recent_travel: bool,

    #[serde(default)]
    pub recent_exposure: bool,
}

/// Coarse ordered severity shared by disease cases and outbreaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored enum column holds an unexpected value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

/// Outcome of the analysis pipeline for one report.
///
/// Immutable once created; a rerun produces a new result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Additive rule score, always within [0, 1].
    pub risk_score: f64,

    /// Label of the risk tier the score falls into.
    pub risk_level: Severity,

    /// First matching syndrome category, or `"unknown"`.
    pub predicted_syndrome: String,

    /// Confidence in the syndrome label, always within [0, 1].
    pub confidence: f64,

    /// Advisory lines in display order.
    pub recommendations: Vec<String>,

    pub flagged_for_review: bool,

    /// Every review predicate that fired, in evaluation order.
    #[serde(default)]
    pub review_reasons: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

/// A persisted analysis together with the report it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub report: SymptomReport,
    pub result: AnalysisResult,
    pub location: Option<String>,

    /// Surveillance case logged from this analysis, if any.
    pub disease_case_id: Option<i64>,
}

/// Request body for POST /analyses: a report plus where it came from.
///
/// The report fields sit at the top level of the body. They are spelled out
/// here rather than flattened so a decoding error keeps its field path.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub symptoms: Vec<Symptom>,

    #[serde(default)]
    pub vital_signs: Option<VitalSigns>,

    #[serde(default)]
    pub recent_travel: bool,

    #[serde(default)]
    pub recent_exposure: bool,

    /// Clinic or area the patient reported from. Required for surveillance.
    #[serde(default)]
    pub location: Option<String>,
}

impl SubmissionRequest {
    /// Split into the report to analyze and its location.
    pub fn into_parts(self) -> (SymptomReport, Option<String>) {
        let report = SymptomReport {
            symptoms: self.symptoms,
            vital_signs: self.vital_signs,
            recent_travel: self.recent_travel,
            recent_exposure: self.recent_exposure,
        };
        (report, self.location)
    }
}

/// Lifecycle of a disease case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Detected,
    Confirmed,
    Treated,
    Resolved,
    FalsePositive,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Detected => "detected",
            CaseStatus::Confirmed => "confirmed",
            CaseStatus::Treated => "treated",
            CaseStatus::Resolved => "resolved",
            CaseStatus::FalsePositive => "false_positive",
        }
    }

    /// Statuses that count towards outbreak detection.
    pub fn counts_for_detection(&self) -> bool {
        matches!(self, CaseStatus::Detected | CaseStatus::Confirmed)
    }
}

impl FromStr for CaseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(CaseStatus::Detected),
            "confirmed" => Ok(CaseStatus::Confirmed),
            "treated" => Ok(CaseStatus::Treated),
            "resolved" => Ok(CaseStatus::Resolved),
            "false_positive" => Ok(CaseStatus::FalsePositive),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A surveillance record of one analyzed report tagged with a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseCase {
    pub id: i64,
    pub analysis_id: Option<i64>,
    pub disease_name: String,
    pub confidence: f64,
    pub severity: Severity,
    pub is_emergency: bool,
    pub location: String,
    pub case_date: DateTime<Utc>,
    pub status: CaseStatus,
    pub is_outbreak_related: bool,
    pub outbreak_id: Option<i64>,
    pub reviewed_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A disease case that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDiseaseCase {
    #[serde(default)]
    pub analysis_id: Option<i64>,
    pub disease_name: String,
    pub confidence: f64,
    pub severity: Severity,
    #[serde(default)]
    pub is_emergency: bool,
    pub location: String,
    pub case_date: DateTime<Utc>,
    #[serde(default = "default_case_status")]
    pub status: CaseStatus,
}

fn default_case_status() -> CaseStatus {
    CaseStatus::Detected
}

/// Request body for PATCH /cases/:id (doctor review).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseReviewRequest {
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
}

/// Query parameters for GET /cases.
#[derive(Debug, Default, Deserialize)]
pub struct CasesQuery {
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub disease: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

/// Query parameters for GET /analyses.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysesQuery {
    #[serde(default)]
    pub flagged: Option<bool>,
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

fn default_list_limit() -> u32 {
    50
}

/// Lifecycle of an outbreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutbreakStatus {
    Detected,
    Confirmed,
    Contained,
    Resolved,
    FalseAlarm,
}

impl OutbreakStatus {
    /// Statuses covered by the one-active-outbreak-per-key constraint.
    pub const ACTIVE: [OutbreakStatus; 3] = [
        OutbreakStatus::Detected,
        OutbreakStatus::Confirmed,
        OutbreakStatus::Contained,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutbreakStatus::Detected => "detected",
            OutbreakStatus::Confirmed => "confirmed",
            OutbreakStatus::Contained => "contained",
            OutbreakStatus::Resolved => "resolved",
            OutbreakStatus::FalseAlarm => "false_alarm",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Whether a manual status change from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: OutbreakStatus) -> bool {
        use OutbreakStatus::*;
        matches!(
            (self, next),
            (Detected, Confirmed | Contained | Resolved | FalseAlarm)
                | (Confirmed, Contained | Resolved | FalseAlarm)
                | (Contained, Resolved)
        )
    }
}

impl FromStr for OutbreakStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(OutbreakStatus::Detected),
            "confirmed" => Ok(OutbreakStatus::Confirmed),
            "contained" => Ok(OutbreakStatus::Contained),
            "resolved" => Ok(OutbreakStatus::Resolved),
            "false_alarm" => Ok(OutbreakStatus::FalseAlarm),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for OutbreakStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (disease, location) group whose case count crossed the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutbreakCandidate {
    pub disease_name: String,
    pub location: String,
    pub case_count: usize,
    pub emergency_cases: usize,
    pub critical_cases: usize,
    pub average_confidence: f64,
    pub first_case_date: DateTime<Utc>,
    pub last_case_date: DateTime<Utc>,
    pub severity: Severity,
    pub case_ids: Vec<i64>,
}

/// Totals recomputed for an existing outbreak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutbreakStatistics {
    pub total_cases: usize,
    pub emergency_cases: usize,
    pub critical_cases: usize,
    pub average_confidence: f64,
    pub start_date: DateTime<Utc>,
    pub last_case_date: DateTime<Utc>,
    pub severity: Severity,
}

/// One entry of an outbreak's append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutbreakAction {
    pub action: String,
    pub performed_by: Option<String>,
    pub performed_at: DateTime<Utc>,
}

/// A persisted outbreak declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbreak {
    pub id: i64,
    pub disease_name: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub last_case_date: DateTime<Utc>,
    pub total_cases: usize,
    pub emergency_cases: usize,
    pub critical_cases: usize,
    pub average_confidence: f64,
    pub severity: Severity,
    pub threshold: u32,
    pub time_window_days: u32,
    pub status: OutbreakStatus,
    pub affected_case_ids: Vec<i64>,
    pub actions: Vec<OutbreakAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for POST /outbreaks/detect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub threshold: Option<u32>,
    #[serde(default)]
    pub time_window_days: Option<u32>,
}

/// Request body for PATCH /outbreaks/:id/status.
#[derive(Debug, Clone, Deserialize)]
pub struct OutbreakStatusRequest {
    pub status: OutbreakStatus,
    #[serde(default)]
    pub performed_by: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Request body for POST /outbreaks/:id/actions.
#[derive(Debug, Clone, Deserialize)]
pub struct OutbreakActionRequest {
    pub action: String,
    #[serde(default)]
    pub performed_by: Option<String>,
}

/// Query parameters for GET /outbreaks.
#[derive(Debug, Default, Deserialize)]
pub struct OutbreaksQuery {
    #[serde(default)]
    pub active: Option<bool>,
}

/// Query parameters for GET /surveillance/summary.
#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Days of case history to summarize (default: 30)
    #[serde(default = "default_summary_days")]
    pub days: u32,
}

fn default_summary_days() -> u32 {
    30
}
