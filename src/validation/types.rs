use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{Confidence, FlagCategory, FlagSeverity, Gender};
use crate::models::{BiomarkerDefinition, Measurement, Panel};

// ---------------------------------------------------------------------------
// ValidationFlag
// ---------------------------------------------------------------------------

/// A structured annotation produced by one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFlag {
    pub id: Uuid,
    pub panel_id: Uuid,
    /// `None` for panel-level flags and for a proposed measurement that
    /// does not exist yet.
    pub measurement_id: Option<Uuid>,
    pub biomarker_code: String,
    pub severity: FlagSeverity,
    pub category: FlagCategory,
    pub message: String,
    pub original_value: Option<Decimal>,
    pub corrected_value: Option<Decimal>,
    pub detail: FlagDetail,
    pub resolved: bool,
}

impl ValidationFlag {
    pub fn new(
        panel_id: Uuid,
        biomarker_code: &str,
        severity: FlagSeverity,
        category: FlagCategory,
        message: String,
        detail: FlagDetail,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            panel_id,
            measurement_id: None,
            biomarker_code: biomarker_code.to_string(),
            severity,
            category,
            message,
            original_value: None,
            corrected_value: None,
            detail,
            resolved: false,
        }
    }

    pub fn for_measurement(mut self, measurement: &Measurement) -> Self {
        self.measurement_id = Some(measurement.id);
        self.original_value = Some(measurement.value);
        self
    }

    pub fn corrected_to(mut self, value: Decimal) -> Self {
        self.corrected_value = Some(value);
        self
    }
}

// ---------------------------------------------------------------------------
// FlagDetail variants
// ---------------------------------------------------------------------------

/// Machine-readable evidence behind a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagDetail {
    Physiological {
        value: Decimal,
        absolute_min: Decimal,
        absolute_max: Decimal,
    },
    LipidFormula {
        formula: String,
        expected: Decimal,
        actual: Decimal,
        deviation_pct: f64,
    },
    DifferentialSum {
        formula: String,
        total: Decimal,
        component_sum: Decimal,
        components: BTreeMap<String, Decimal>,
        deviation_pct: f64,
    },
    PercentageConversion {
        formula: String,
        percentage: Decimal,
        total: Decimal,
        absolute: Decimal,
    },
    Estimate {
        formula: String,
        total: Decimal,
        component_sum: Decimal,
        components: BTreeMap<String, Decimal>,
        estimate: Decimal,
    },
    DuplicatePanel {
        duplicate_panel_id: Uuid,
        duplicate_exam_date: NaiveDate,
        match_pct: f64,
        exact_matches: usize,
        total_compared: usize,
    },
    Historical {
        previous_value: Decimal,
        current_value: Decimal,
        change_pct: f64,
        previous_exam_date: NaiveDate,
    },
    LowConfidence {
        raw_name: Option<String>,
        raw_code: Option<String>,
        confidence: Confidence,
    },
    Unmatched {
        raw_name: Option<String>,
        raw_code: Option<String>,
        raw_value: String,
        unit: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One panel with its measurements, ready for pure detection.
#[derive(Debug, Clone)]
pub struct PanelSnapshot {
    pub panel: Panel,
    pub measurements: Vec<Measurement>,
}

impl PanelSnapshot {
    /// Measurements keyed by biomarker code, iterated in code order.
    pub fn by_code(&self) -> BTreeMap<&str, &Measurement> {
        self.measurements
            .iter()
            .map(|m| (m.biomarker_code.as_str(), m))
            .collect()
    }

    pub fn get(&self, code: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.biomarker_code == code)
    }

    pub fn value_of(&self, code: &str) -> Option<Decimal> {
        self.get(code).map(|m| m.value)
    }
}

/// Everything one validation pass reads, fetched up front so that the
/// detection layers stay pure.
#[derive(Debug, Clone)]
pub struct ValidationSnapshot {
    pub current: PanelSnapshot,
    pub gender: Gender,
    /// Definitions for every code in the current panel, plus any code a
    /// proposed correction may insert.
    pub definitions: BTreeMap<String, BiomarkerDefinition>,
    /// Most recent completed panels of the subject, excluding the current one.
    pub recent_panels: Vec<PanelSnapshot>,
    /// Most recent completed panel dated strictly before the current exam.
    pub previous_panel: Option<PanelSnapshot>,
    /// Codes stored for the current panel whose values could not be read.
    pub unreadable_codes: BTreeSet<String>,
}

impl ValidationSnapshot {
    pub fn panel_id(&self) -> Uuid {
        self.current.panel.id
    }

    /// Whether the current panel stores `code`, readable or not.
    pub fn has_stored(&self, code: &str) -> bool {
        self.current.get(code).is_some() || self.unreadable_codes.contains(code)
    }

    pub fn definition(&self, code: &str) -> Option<&BiomarkerDefinition> {
        self.definitions.get(code)
    }

    /// Display name for messages; falls back to the code.
    pub fn display_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.definitions
            .get(code)
            .map(|d| d.name.as_str())
            .unwrap_or(code)
    }

    pub fn unit_of(&self, code: &str) -> &str {
        self.definitions
            .get(code)
            .map(|d| d.unit.as_str())
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Number of flags per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCounts {
    pub info: usize,
    pub auto_corrected: usize,
    pub warning: usize,
    pub error: usize,
}

impl FlagCounts {
    pub fn from_flags(flags: &[ValidationFlag]) -> Self {
        let mut counts = Self::default();
        for flag in flags {
            match flag.severity {
                FlagSeverity::Info => counts.info += 1,
                FlagSeverity::AutoCorrected => counts.auto_corrected += 1,
                FlagSeverity::Warning => counts.warning += 1,
                FlagSeverity::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.info + self.auto_corrected + self.warning + self.error
    }
}

/// Measurement changes performed by `apply_corrections`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionSummary {
    pub updated: usize,
    pub inserted: usize,
}

/// Outcome of a full processing run over one panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub panel_id: Uuid,
    pub flags: Vec<ValidationFlag>,
    pub counts: FlagCounts,
    pub corrections: CorrectionSummary,
    pub processing_time_ms: u64,
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Panel not found: {0}")]
    PanelNotFound(Uuid),

    #[error("No catalog definition for biomarker: {0}")]
    CatalogUnavailable(String),

    #[error("Config load failed ({0}): {1}")]
    ConfigLoad(String, String),

    #[error("Config parse failed ({0}): {1}")]
    ConfigParse(String, String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal lock failed")]
    LockFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(severity: FlagSeverity) -> ValidationFlag {
        ValidationFlag::new(
            Uuid::nil(),
            "HGB",
            severity,
            FlagCategory::Physiological,
            "test".into(),
            FlagDetail::Physiological {
                value: Decimal::from(2),
                absolute_min: Decimal::from(3),
                absolute_max: Decimal::from(25),
            },
        )
    }

    #[test]
    fn flag_counts_by_severity() {
        let flags = vec![
            flag(FlagSeverity::Error),
            flag(FlagSeverity::Warning),
            flag(FlagSeverity::Warning),
            flag(FlagSeverity::AutoCorrected),
        ];
        let counts = FlagCounts::from_flags(&flags);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.warning, 2);
        assert_eq!(counts.auto_corrected, 1);
        assert_eq!(counts.info, 0);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn detail_serializes_with_kind_tag() {
        let detail = FlagDetail::Historical {
            previous_value: Decimal::new(9, 1),
            current_value: Decimal::from(3),
            change_pct: 233.3,
            previous_exam_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "historical");
        assert_eq!(json["previous_exam_date"], "2024-01-10");

        let back: FlagDetail = serde_json::from_value(json).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn measurement_flag_records_original_value() {
        let m = Measurement {
            id: Uuid::new_v4(),
            panel_id: Uuid::nil(),
            biomarker_code: "HGB".into(),
            value: Decimal::new(29, 1),
            ref_min: None,
            ref_max: None,
            is_abnormal: false,
        };
        let f = flag(FlagSeverity::Error).for_measurement(&m);
        assert_eq!(f.measurement_id, Some(m.id));
        assert_eq!(f.original_value, Some(Decimal::new(29, 1)));
        assert!(f.corrected_value.is_none());
    }
}
