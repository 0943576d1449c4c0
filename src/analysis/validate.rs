//! Submission validation.
//!
//! Runs before any scoring. The first failing field is reported; no partial
//! analysis is ever produced for a rejected report.

use crate::error::AnalysisError;
use crate::model::{DurationUnit, SymptomReport, VitalSigns};

/// Inclusive bounds for a symptom severity.
pub const SEVERITY_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// Check a report for values the pipeline cannot score.
pub fn validate_report(report: &SymptomReport) -> Result<(), AnalysisError> {
    if report.symptoms.is_empty() {
        return Err(AnalysisError::invalid(
            "symptoms",
            "at least one symptom is required",
        ));
    }

    for (i, symptom) in report.symptoms.iter().enumerate() {
        if symptom.name.trim().is_empty() {
            return Err(AnalysisError::invalid(
                format!("symptoms[{i}].name"),
                "must not be blank",
            ));
        }
        if !SEVERITY_RANGE.contains(&symptom.severity) {
            return Err(AnalysisError::invalid(
                format!("symptoms[{i}].severity"),
                format!("must be between 1 and 10, got {}", symptom.severity),
            ));
        }
        if !symptom.duration.value.is_finite() || symptom.duration.value < 0.0 {
            return Err(AnalysisError::invalid(
                format!("symptoms[{i}].duration.value"),
                "must be a non-negative number",
            ));
        }
        if symptom.duration.unit.parse::<DurationUnit>().is_err() {
            return Err(AnalysisError::invalid(
                format!("symptoms[{i}].duration.unit"),
                format!(
                    "must be one of minutes, hours, days, weeks; got '{}'",
                    symptom.duration.unit
                ),
            ));
        }
    }

    if let Some(vitals) = &report.vital_signs {
        validate_vitals(vitals)?;
    }

    Ok(())
}

fn validate_vitals(vitals: &VitalSigns) -> Result<(), AnalysisError> {
    let readings = [
        ("vital_signs.temperature", vitals.temperature),
        ("vital_signs.heart_rate", vitals.heart_rate),
        ("vital_signs.respiratory_rate", vitals.respiratory_rate),
        ("vital_signs.oxygen_saturation", vitals.oxygen_saturation),
        (
            "vital_signs.blood_pressure.systolic",
            vitals.blood_pressure.map(|bp| bp.systolic),
        ),
        (
            "vital_signs.blood_pressure.diastolic",
            vitals.blood_pressure.map(|bp| bp.diastolic),
        ),
    ];

    for (field, value) in readings {
        if let Some(v) = value {
            if !v.is_finite() || v <= 0.0 {
                return Err(AnalysisError::invalid(field, "must be a positive number"));
            }
        }
    }

    if let Some(o2) = vitals.oxygen_saturation {
        if o2 > 100.0 {
            return Err(AnalysisError::invalid(
                "vital_signs.oxygen_saturation",
                "must not exceed 100",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BloodPressure, Symptom, SymptomDuration};

    fn symptom(name: &str, severity: i32, unit: &str) -> Symptom {
        Symptom {
            name: name.to_string(),
            severity,
            duration: SymptomDuration {
                value: 2.0,
                unit: unit.to_string(),
            },
        }
    }

    fn report(symptoms: Vec<Symptom>) -> SymptomReport {
        SymptomReport {
            symptoms,
            vital_signs: None,
            recent_travel: false,
            recent_exposure: false,
        }
    }

    fn field_of(err: AnalysisError) -> String {
        match err {
            AnalysisError::InvalidInput { field, .. } => field,
        }
    }

    #[test]
    fn test_valid_report_passes() {
        let report = report(vec![symptom("fever", 5, "days"), symptom("cough", 10, "Hours")]);
        assert!(validate_report(&report).is_ok());
    }

    #[test]
    fn test_empty_symptom_list_rejected() {
        let err = validate_report(&report(vec![])).unwrap_err();
        assert_eq!(field_of(err), "symptoms");
    }

    #[test]
    fn test_severity_out_of_range_rejected() {
        let err = validate_report(&report(vec![symptom("fever", 0, "days")])).unwrap_err();
        assert_eq!(field_of(err), "symptoms[0].severity");

        let err = validate_report(&report(vec![
            symptom("fever", 3, "days"),
            symptom("cough", 11, "days"),
        ]))
        .unwrap_err();
        assert_eq!(field_of(err), "symptoms[1].severity");
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let err = validate_report(&report(vec![symptom("fever", 3, "months")])).unwrap_err();
        assert_eq!(field_of(err), "symptoms[0].duration.unit");
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = validate_report(&report(vec![symptom("   ", 3, "days")])).unwrap_err();
        assert_eq!(field_of(err), "symptoms[0].name");
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut s = symptom("fever", 3, "days");
        s.duration.value = -1.0;
        let err = validate_report(&report(vec![s])).unwrap_err();
        assert_eq!(field_of(err), "symptoms[0].duration.value");
    }

    #[test]
    fn test_implausible_vitals_rejected() {
        let mut r = report(vec![symptom("fever", 3, "days")]);
        r.vital_signs = Some(VitalSigns {
            oxygen_saturation: Some(101.0),
            ..Default::default()
        });
        let err = validate_report(&r).unwrap_err();
        assert_eq!(field_of(err), "vital_signs.oxygen_saturation");

        r.vital_signs = Some(VitalSigns {
            blood_pressure: Some(BloodPressure {
                systolic: 120.0,
                diastolic: -5.0,
            }),
            ..Default::default()
        });
        let err = validate_report(&r).unwrap_err();
        assert_eq!(field_of(err), "vital_signs.blood_pressure.diastolic");
    }
}
