//! Rule tables driving the analysis pipeline.
//!
//! Every weight, trigger list, threshold and advice string used by
//! [`crate::analysis`] lives in one [`RuleConfig`] value. The built-in tables
//! come from [`RuleConfig::default`]; a JSON file can override any subset of
//! them at start-up. The config is built once and handed to the
//! [`crate::analysis::Analyzer`], never read from ambient global state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::analysis::features::normalize_symptom_name;
use crate::model::Severity;

/// Values imputed for vital signs missing from a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalDefaults {
    pub temperature: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub heart_rate: f64,
    pub respiratory_rate: f64,
    pub oxygen_saturation: f64,
}

impl Default for VitalDefaults {
    fn default() -> Self {
        Self {
            temperature: 98.6,
            systolic: 120.0,
            diastolic: 80.0,
            heart_rate: 72.0,
            respiratory_rate: 16.0,
            oxygen_saturation: 98.0,
        }
    }
}

/// Additive risk penalties for abnormal vital signs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalPenalties {
    pub temperature_above: f64,
    pub temperature_penalty: f64,
    pub heart_rate_above: f64,
    pub heart_rate_penalty: f64,
    pub oxygen_below: f64,
    pub oxygen_penalty: f64,
}

impl Default for VitalPenalties {
    fn default() -> Self {
        Self {
            temperature_above: 102.0,
            temperature_penalty: 0.20,
            heart_rate_above: 100.0,
            heart_rate_penalty: 0.10,
            oxygen_below: 95.0,
            oxygen_penalty: 0.30,
        }
    }
}

/// A syndrome category and the symptoms that trigger it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyndromeRule {
    pub name: String,
    pub triggers: Vec<String>,

    /// Minimum number of distinct triggers that must be present.
    pub min_matches: usize,
}

impl SyndromeRule {
    fn new(name: &str, triggers: &[&str], min_matches: usize) -> Self {
        Self {
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            min_matches,
        }
    }
}

/// Catalog view of one syndrome category, as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyndromeInfo {
    pub name: String,
    pub triggers: Vec<String>,
    pub min_matches: usize,

    /// Advice given when this syndrome is predicted.
    pub advice: Vec<String>,

    /// Whether a case with this syndrome is always an emergency.
    pub emergency: bool,
}

/// A risk band with its label and advice block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    /// Inclusive lower bound of the band.
    pub min_score: f64,
    pub level: Severity,
    pub advice: Vec<String>,
}

/// Thresholds of the review-flagging policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewThresholds {
    /// Flag when the risk score is at or above this value.
    pub risk_score: f64,

    /// Flag when confidence is strictly below this value.
    pub min_confidence: f64,

    /// Severity at or above which a symptom counts as severe.
    pub severe_symptom: i32,

    /// Flag when at least this many symptoms are severe.
    pub severe_symptom_count: usize,

    pub temperature_above: f64,
    pub heart_rate_above: f64,
    pub oxygen_below: f64,
}

impl Default for ReviewThresholds {
    fn default() -> Self {
        Self {
            risk_score: 0.7,
            min_confidence: 0.3,
            severe_symptom: 8,
            severe_symptom_count: 2,
            temperature_above: 103.0,
            heart_rate_above: 100.0,
            oxygen_below: 95.0,
        }
    }
}

/// The complete rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub vital_defaults: VitalDefaults,

    /// Starting risk before any symptom or vital contributes.
    pub base_risk: f64,

    /// Risk contribution per normalized symptom name.
    pub symptom_weights: BTreeMap<String, f64>,

    pub vital_penalties: VitalPenalties,

    /// Syndrome categories in evaluation order. The first match wins.
    pub syndromes: Vec<SyndromeRule>,

    /// Risk bands, highest first. The last band should start at 0.
    pub risk_tiers: Vec<RiskTier>,

    /// Advice keyed by normalized syndrome name.
    pub syndrome_advice: BTreeMap<String, Vec<String>>,

    /// Advice used when the syndrome has no dictionary entry.
    pub generic_advice: Vec<String>,

    pub temperature_advice: String,
    pub cough_advice: Vec<String>,

    pub review: ReviewThresholds,

    /// Syndromes whose derived disease cases are always emergencies.
    pub emergency_syndromes: Vec<String>,

    /// Risk score at or above which a derived disease case is an emergency.
    pub emergency_risk_score: f64,
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RuleConfig {
    fn default() -> Self {
        let symptom_weights = [
            ("fever", 0.30),
            ("chest_pain", 0.40),
            ("shortness_of_breath", 0.30),
            ("dizziness", 0.20),
            ("cough", 0.15),
            ("headache", 0.10),
            ("fatigue", 0.10),
            ("nausea", 0.15),
            ("vomiting", 0.20),
            ("diarrhea", 0.15),
            ("abdominal_pain", 0.20),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect();

        let syndromes = vec![
            SyndromeRule::new(
                "respiratory_infection",
                &["cough", "shortness_of_breath", "sore_throat", "runny_nose", "congestion"],
                2,
            ),
            SyndromeRule::new(
                "gastrointestinal",
                &["nausea", "vomiting", "diarrhea", "abdominal_pain", "loss_of_appetite"],
                2,
            ),
            SyndromeRule::new("flu", &["fever", "chills", "body_aches", "fatigue", "headache"], 2),
            SyndromeRule::new(
                "neurological",
                &["headache", "dizziness", "confusion", "numbness", "blurred_vision"],
                2,
            ),
            // A single cardiac trigger is enough.
            SyndromeRule::new(
                "cardiac",
                &["chest_pain", "palpitations", "irregular_heartbeat", "arm_pain", "jaw_pain"],
                1,
            ),
        ];

        let risk_tiers = vec![
            RiskTier {
                min_score: 0.8,
                level: Severity::Critical,
                advice: lines(&[
                    "Seek immediate medical attention",
                    "Go to the nearest emergency room or call emergency services",
                ]),
            },
            RiskTier {
                min_score: 0.6,
                level: Severity::High,
                advice: lines(&[
                    "Schedule an urgent appointment with a doctor within 24 hours",
                    "Monitor your symptoms closely",
                ]),
            },
            RiskTier {
                min_score: 0.4,
                level: Severity::Medium,
                advice: lines(&[
                    "Schedule a routine appointment with your doctor",
                    "Monitor symptoms and seek help if they persist",
                ]),
            },
            RiskTier {
                min_score: 0.0,
                level: Severity::Low,
                advice: lines(&[
                    "Rest and care for yourself at home",
                    "Consult a doctor if symptoms worsen",
                ]),
            },
        ];

        let syndrome_advice = [
            (
                "respiratory_infection",
                lines(&[
                    "Stay hydrated and get plenty of rest",
                    "Use a humidifier or steam inhalation to ease breathing",
                    "Avoid close contact with others to prevent spread",
                ]),
            ),
            (
                "gastrointestinal",
                lines(&[
                    "Drink clear fluids to prevent dehydration",
                    "Eat bland foods such as rice, bananas and toast",
                    "Avoid dairy, caffeine and fatty foods until symptoms settle",
                ]),
            ),
            (
                "fever",
                lines(&[
                    "Take fever reducers as directed on the label",
                    "Rest in a cool, comfortable environment",
                ]),
            ),
        ]
        .into_iter()
        .map(|(name, advice)| (name.to_string(), advice))
        .collect();

        Self {
            vital_defaults: VitalDefaults::default(),
            base_risk: 0.10,
            symptom_weights,
            vital_penalties: VitalPenalties::default(),
            syndromes,
            risk_tiers,
            syndrome_advice,
            generic_advice: lines(&[
                "Keep a record of your symptoms and when they occur",
                "Follow up with a healthcare provider if symptoms change",
            ]),
            temperature_advice: "Monitor your temperature regularly".to_string(),
            cough_advice: lines(&[
                "Drink warm fluids to soothe your throat",
                "Use honey or throat lozenges for cough relief",
            ]),
            review: ReviewThresholds::default(),
            emergency_syndromes: lines(&["cardiac"]),
            emergency_risk_score: 0.8,
        }
    }
}

impl RuleConfig {
    /// Load a rule configuration from a JSON file.
    ///
    /// Fields missing from the file keep their built-in values.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("loading rules file {}", path.display()))
    }

    /// Parse, normalize and validate a rule configuration.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut config: RuleConfig = serde_json::from_str(raw)?;
        config.normalize_names()?;
        config.validate()?;
        Ok(config)
    }

    /// Rewrite every symptom and syndrome name into the form reports are
    /// matched in, so `"Sore Throat"` in a rules file means `sore_throat`.
    ///
    /// Fails if two names collapse onto the same normalized key.
    pub fn normalize_names(&mut self) -> anyhow::Result<()> {
        let mut weights = BTreeMap::new();
        for (name, weight) in std::mem::take(&mut self.symptom_weights) {
            let key = normalize_symptom_name(&name);
            if weights.insert(key.clone(), weight).is_some() {
                bail!("symptom_weights has more than one entry for '{key}'");
            }
        }
        self.symptom_weights = weights;

        for rule in &mut self.syndromes {
            rule.name = normalize_symptom_name(&rule.name);
            for trigger in &mut rule.triggers {
                *trigger = normalize_symptom_name(trigger);
            }
        }

        let mut advice = BTreeMap::new();
        for (name, lines) in std::mem::take(&mut self.syndrome_advice) {
            let key = normalize_symptom_name(&name);
            if advice.insert(key.clone(), lines).is_some() {
                bail!("syndrome_advice has more than one entry for '{key}'");
            }
        }
        self.syndrome_advice = advice;

        for name in &mut self.emergency_syndromes {
            *name = normalize_symptom_name(name);
        }
        Ok(())
    }

    /// Check the invariants the analysis pipeline relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.risk_tiers.is_empty() {
            bail!("risk_tiers must not be empty");
        }
        if self
            .risk_tiers
            .windows(2)
            .any(|pair| pair[0].min_score < pair[1].min_score)
        {
            bail!("risk_tiers must be ordered from highest to lowest min_score");
        }
        if self.risk_tiers.iter().any(|t| t.advice.is_empty()) {
            bail!("every risk tier needs at least one advice line");
        }
        if self.generic_advice.is_empty() {
            bail!("generic_advice must not be empty");
        }
        let unit = |value: f64| (0.0..=1.0).contains(&value);
        if !unit(self.base_risk) {
            bail!("base_risk must lie within [0, 1]");
        }
        for (name, weight) in &self.symptom_weights {
            if !unit(*weight) {
                bail!("weight for '{name}' must lie within [0, 1]");
            }
        }
        let penalties = &self.vital_penalties;
        if ![
            penalties.temperature_penalty,
            penalties.heart_rate_penalty,
            penalties.oxygen_penalty,
        ]
        .into_iter()
        .all(unit)
        {
            bail!("vital penalties must lie within [0, 1]");
        }
        if self.risk_tiers.iter().any(|t| !unit(t.min_score)) {
            bail!("risk tier min_score values must lie within [0, 1]");
        }
        if !unit(self.review.risk_score) || !unit(self.review.min_confidence) {
            bail!("review risk_score and min_confidence must lie within [0, 1]");
        }
        if !unit(self.emergency_risk_score) {
            bail!("emergency_risk_score must lie within [0, 1]");
        }

        let names = self
            .symptom_weights
            .keys()
            .chain(self.syndromes.iter().map(|rule| &rule.name))
            .chain(self.syndromes.iter().flat_map(|rule| rule.triggers.iter()))
            .chain(self.syndrome_advice.keys())
            .chain(self.emergency_syndromes.iter());
        for name in names {
            if name.is_empty() || *name != normalize_symptom_name(name) {
                bail!("name '{name}' is not normalized");
            }
        }

        for rule in &self.syndromes {
            if rule.min_matches == 0 || rule.min_matches > rule.triggers.len() {
                bail!(
                    "syndrome '{}' needs min_matches between 1 and its trigger count",
                    rule.name
                );
            }
        }
        Ok(())
    }

    /// Every symptom name the rules know about, normalized.
    pub fn known_symptoms(&self) -> BTreeSet<String> {
        self.symptom_weights
            .keys()
            .cloned()
            .chain(
                self.syndromes
                    .iter()
                    .flat_map(|rule| rule.triggers.iter().cloned()),
            )
            .collect()
    }

    /// Describe every syndrome category in priority order.
    pub fn syndrome_catalog(&self) -> Vec<SyndromeInfo> {
        self.syndromes.iter().map(|rule| self.describe(rule)).collect()
    }

    /// Describe the syndrome called `name`, matched after normalization.
    pub fn syndrome_info(&self, name: &str) -> Option<SyndromeInfo> {
        let name = normalize_symptom_name(name);
        self.syndromes
            .iter()
            .find(|rule| rule.name == name)
            .map(|rule| self.describe(rule))
    }

    fn describe(&self, rule: &SyndromeRule) -> SyndromeInfo {
        SyndromeInfo {
            name: rule.name.clone(),
            triggers: rule.triggers.clone(),
            min_matches: rule.min_matches,
            advice: self
                .syndrome_advice
                .get(&rule.name)
                .unwrap_or(&self.generic_advice)
                .clone(),
            emergency: self.emergency_syndromes.contains(&rule.name),
        }
    }

    /// The band a risk score falls into.
    ///
    /// Scores below every band land in the last one.
    pub fn tier_for(&self, risk_score: f64) -> &RiskTier {
        self.risk_tiers
            .iter()
            .find(|tier| risk_score >= tier.min_score)
            .unwrap_or_else(|| &self.risk_tiers[self.risk_tiers.len() - 1])
    }
}
