use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::FlagSeverity;

use super::types::ValidationFlag;

/// Overall state of a panel after validation. Only unresolved flags count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelValidationStatus {
    Clean,
    Warnings,
    Errors,
}

impl PanelValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Warnings => "warnings",
            Self::Errors => "errors",
        }
    }
}

/// State of a single measurement: the most severe unresolved flag on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    Clean,
    Info,
    AutoCorrected,
    Warning,
    Error,
}

impl MeasurementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Info => "info",
            Self::AutoCorrected => "auto_corrected",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl From<FlagSeverity> for MeasurementStatus {
    fn from(severity: FlagSeverity) -> Self {
        match severity {
            FlagSeverity::Info => Self::Info,
            FlagSeverity::AutoCorrected => Self::AutoCorrected,
            FlagSeverity::Warning => Self::Warning,
            FlagSeverity::Error => Self::Error,
        }
    }
}

/// Errors block a clean status; auto-corrections count as warnings.
pub fn panel_status(flags: &[ValidationFlag]) -> PanelValidationStatus {
    let unresolved = || flags.iter().filter(|f| !f.resolved);

    if unresolved().any(|f| f.severity == FlagSeverity::Error) {
        PanelValidationStatus::Errors
    } else if unresolved()
        .any(|f| matches!(f.severity, FlagSeverity::Warning | FlagSeverity::AutoCorrected))
    {
        PanelValidationStatus::Warnings
    } else {
        PanelValidationStatus::Clean
    }
}

pub fn measurement_status(flags: &[ValidationFlag], measurement_id: &Uuid) -> MeasurementStatus {
    flags
        .iter()
        .filter(|f| !f.resolved && f.measurement_id.as_ref() == Some(measurement_id))
        .map(|f| f.severity)
        .max_by_key(|s| s.rank())
        .map(MeasurementStatus::from)
        .unwrap_or(MeasurementStatus::Clean)
}

pub fn unresolved_count(flags: &[ValidationFlag]) -> usize {
    flags.iter().filter(|f| !f.resolved).count()
}
