use std::collections::BTreeSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::enums::{Gender, PanelStatus};
use crate::models::{BiomarkerDefinition, Measurement, Panel};

use super::types::{CorrectionSummary, ValidationError, ValidationFlag};

/// Read access to the biomarker catalog.
pub trait CatalogLookup {
    fn definition(&self, code: &str) -> Result<Option<BiomarkerDefinition>, ValidationError>;
}

/// Read access to panels, their measurements and the subject's history.
pub trait PanelHistoryLookup {
    fn panel(&self, panel_id: &Uuid) -> Result<Option<Panel>, ValidationError>;

    fn subject_gender(&self, subject_id: &Uuid) -> Result<Gender, ValidationError>;

    /// Measurements of a panel, ordered by biomarker code.
    fn measurements(&self, panel_id: &Uuid) -> Result<Vec<Measurement>, ValidationError>;

    /// Every biomarker code stored for a panel, including rows whose value
    /// cannot be read.
    fn measurement_codes(&self, panel_id: &Uuid) -> Result<BTreeSet<String>, ValidationError> {
        Ok(self
            .measurements(panel_id)?
            .into_iter()
            .map(|m| m.biomarker_code)
            .collect())
    }

    /// Up to `limit` completed panels of the subject, most recent first,
    /// excluding `exclude`.
    fn recent_completed_panels(
        &self,
        subject_id: &Uuid,
        exclude: &Uuid,
        limit: usize,
    ) -> Result<Vec<Panel>, ValidationError>;

    /// Most recent completed panel dated strictly before `before`.
    fn previous_completed_panel(
        &self,
        subject_id: &Uuid,
        before: &NaiveDate,
    ) -> Result<Option<Panel>, ValidationError>;
}

/// Write-back used by corrections and the processing pipeline.
pub trait PanelWriter {
    fn update_measurement(&self, measurement: &Measurement) -> Result<(), ValidationError>;

    /// Store a new measurement. Fails if the panel already has one for
    /// the same biomarker.
    fn insert_measurement(&self, measurement: &Measurement) -> Result<(), ValidationError>;

    /// Discard every stored flag of the panel and store `flags` in order.
    fn replace_flags(
        &self,
        panel_id: &Uuid,
        flags: &[ValidationFlag],
    ) -> Result<usize, ValidationError>;

    fn set_panel_status(
        &self,
        panel_id: &Uuid,
        status: PanelStatus,
        error_message: Option<&str>,
    ) -> Result<(), ValidationError>;

    /// Run `work` so that its writes land together or not at all, and so
    /// that no other writer interleaves with it. Stores without
    /// transactions run it directly.
    fn atomically<T, F>(&self, work: F) -> Result<T, ValidationError>
    where
        F: FnOnce() -> Result<T, ValidationError>,
    {
        work()
    }
}

/// The validation engine.
pub trait PanelValidator {
    /// Run every detection layer over a panel and return the flags,
    /// including proposed corrections. Performs no writes.
    fn validate<S>(&self, store: &S, panel_id: &Uuid) -> Result<Vec<ValidationFlag>, ValidationError>
    where
        S: CatalogLookup + PanelHistoryLookup;

    /// Perform the corrections proposed by `flags`: overwrite converted
    /// values and insert estimated measurements. Flags for inserted
    /// measurements are linked to the new measurement.
    fn apply_corrections<S>(
        &self,
        store: &S,
        panel_id: &Uuid,
        flags: &mut [ValidationFlag],
    ) -> Result<CorrectionSummary, ValidationError>
    where
        S: CatalogLookup + PanelHistoryLookup + PanelWriter;
}
