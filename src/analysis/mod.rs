//! Rule-based symptom analysis.
//!
//! A submitted report flows through:
//!
//! 1. [`validate`]: reject reports the rules cannot score
//! 2. [`features`]: normalize names, impute vitals, scale values
//! 3. [`risk`] and [`syndrome`]: independent scoring and classification
//! 4. [`recommendations`] and [`review`]: advice and the review flag
//!
//! The pipeline is synchronous and touches no shared mutable state, so one
//! [`Analyzer`] can serve every request concurrently.

pub mod features;
pub mod recommendations;
pub mod review;
pub mod risk;
pub mod syndrome;
pub mod validate;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::AnalysisError;
use crate::model::{AnalysisResult, SymptomReport};
use crate::rules::RuleConfig;

pub use features::{FeatureVector, extract_features, normalize_symptom_name};
pub use recommendations::recommend;
pub use review::{ReviewDecision, ReviewReason, review};
pub use risk::score_risk;
pub use syndrome::{SyndromeMatch, classify_syndrome};
pub use validate::validate_report;

/// Runs the analysis pipeline against a fixed rule configuration.
#[derive(Debug, Clone)]
pub struct Analyzer {
    rules: Arc<RuleConfig>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(RuleConfig::default())
    }
}

impl Analyzer {
    pub fn new(rules: RuleConfig) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Analyze a report, stamping the result with the current time.
    pub fn analyze(&self, report: &SymptomReport) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_at(report, Utc::now())
    }

    /// Analyze a report with an explicit timestamp.
    pub fn analyze_at(
        &self,
        report: &SymptomReport,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, AnalysisError> {
        validate_report(report)?;

        let rules = self.rules.as_ref();
        let features = extract_features(report, rules);
        let risk_score = score_risk(&features, rules);
        let syndrome = classify_syndrome(&features.symptom_names(), rules);
        let recommendations = recommend(risk_score, &syndrome.syndrome, report, rules);
        let decision = review(risk_score, syndrome.confidence, report, &features, rules);

        debug!(
            symptom_count = features.symptoms.len(),
            risk_score,
            syndrome = %syndrome.syndrome,
            confidence = syndrome.confidence,
            flagged = decision.flagged,
            "Report analyzed"
        );

        Ok(AnalysisResult {
            risk_score,
            risk_level: rules.tier_for(risk_score).level,
            predicted_syndrome: syndrome.syndrome,
            confidence: syndrome.confidence,
            recommendations,
            flagged_for_review: decision.flagged,
            review_reasons: decision
                .reasons
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            timestamp: now,
        })
    }
}
