//! CareWatch - rule-based symptom analysis and outbreak surveillance.
//!
//! # Overview
//!
//! CareWatch scores patient-submitted symptom reports against a configurable
//! rule set: a risk score and level, a predicted syndrome with a confidence,
//! recommendations, and a decision on whether a clinician should review the
//! result. Analyses with a recognized syndrome and a location become disease
//! cases, which are grouped by disease and location to detect outbreaks.
//!
//! Every score is deterministic for a given report and rule set. Rules load
//! from JSON, so weights and thresholds can change without a rebuild.
//!
//! # Modules
//!
//! - [`model`]: Reports, analysis results, cases and outbreaks
//! - [`rules`]: The scoring rule set and its defaults
//! - [`analysis`]: Validation, features, risk, syndrome, recommendations, review
//! - [`surveillance`]: Outbreak detection and lifecycle
//! - [`summary`]: Case counts for the surveillance summary
//! - [`storage`]: SQLite storage layer
//! - [`config`]: Environment configuration
//! - [`error`]: Error types and their HTTP mapping
//! - [`api`]: HTTP API handlers

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod rules;
pub mod storage;
pub mod summary;
pub mod surveillance;
