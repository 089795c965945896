use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::models::Measurement;

use super::codes::BASO;
use super::config::ValidationConfig;
use super::corrections::{proposed_corrections, Correction};
use super::detection::{
    detect_differential_mismatch, detect_duplicate_panels, detect_historical_changes,
    detect_lipid_mismatch, detect_out_of_bounds, detect_percentage_differential,
    propose_basophil_estimate,
};
use super::traits::{CatalogLookup, PanelHistoryLookup, PanelValidator, PanelWriter};
use super::types::{
    CorrectionSummary, FlagCounts, PanelSnapshot, ValidationError, ValidationFlag,
    ValidationSnapshot,
};

// ---------------------------------------------------------------------------
// SubjectLocks
// ---------------------------------------------------------------------------

/// One mutex per subject. Validation of two panels of the same subject
/// must not overlap; different subjects proceed independently.
#[derive(Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for a subject, created on first use.
    pub fn for_subject(&self, subject_id: &Uuid) -> Result<Arc<Mutex<()>>, ValidationError> {
        let mut locks = self.locks.lock().map_err(|_| ValidationError::LockFailed)?;
        Ok(locks.entry(*subject_id).or_default().clone())
    }

    /// Forget a subject's lock once no run holds or waits for it.
    /// Callers drop their own handle first.
    pub fn release(&self, subject_id: &Uuid) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(subject_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(subject_id);
        }
    }

    /// Number of subjects with a live lock.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// DefaultPanelValidator
// ---------------------------------------------------------------------------

/// Default implementation of the validation engine.
/// Runs the detection layers in a fixed order and applies proposed corrections.
pub struct DefaultPanelValidator {
    pub(crate) config: ValidationConfig,
    pub(crate) locks: SubjectLocks,
}

impl DefaultPanelValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            locks: SubjectLocks::new(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn subject_locks(&self) -> &SubjectLocks {
        &self.locks
    }

    /// Fetch everything the detection layers read for one panel.
    pub fn load_snapshot<S>(&self, store: &S, panel_id: &Uuid) -> Result<ValidationSnapshot, ValidationError>
    where
        S: CatalogLookup + PanelHistoryLookup,
    {
        let current = load_panel(store, panel_id)?;
        let subject_id = current.panel.subject_id;
        let gender = store.subject_gender(&subject_id)?;

        let mut definitions = BTreeMap::new();
        for m in &current.measurements {
            let definition = store
                .definition(&m.biomarker_code)?
                .ok_or_else(|| ValidationError::CatalogUnavailable(m.biomarker_code.clone()))?;
            definitions.insert(m.biomarker_code.clone(), definition);
        }
        if !definitions.contains_key(BASO) {
            if let Some(baso) = store.definition(BASO)? {
                definitions.insert(BASO.to_string(), baso);
            }
        }

        let mut recent_panels = Vec::new();
        for panel in store.recent_completed_panels(&subject_id, panel_id, self.config.duplicate_window)? {
            let measurements = store.measurements(&panel.id)?;
            recent_panels.push(PanelSnapshot { panel, measurements });
        }

        let previous_panel = match store.previous_completed_panel(&subject_id, &current.panel.exam_date)? {
            Some(panel) => {
                let measurements = store.measurements(&panel.id)?;
                Some(PanelSnapshot { panel, measurements })
            }
            None => None,
        };

        let unreadable_codes = store
            .measurement_codes(panel_id)?
            .into_iter()
            .filter(|code| current.get(code).is_none())
            .collect();

        Ok(ValidationSnapshot {
            current,
            gender,
            definitions,
            recent_panels,
            previous_panel,
            unreadable_codes,
        })
    }

    /// Run every detection layer over pre-fetched data, in order:
    /// bounds, lipid formula, differential sum, percentage differential,
    /// basophil estimate, duplicates, history.
    pub fn validate_snapshot(&self, data: &ValidationSnapshot) -> Vec<ValidationFlag> {
        let config = &self.config;

        let bounds = detect_out_of_bounds(data, config);
        let lipid = detect_lipid_mismatch(data, config);
        let differential = detect_differential_mismatch(data, config);
        let percentages = detect_percentage_differential(data, config);
        let estimate = propose_basophil_estimate(data, config, &percentages);
        let duplicates = detect_duplicate_panels(data, config);
        let historical = detect_historical_changes(data, config);

        tracing::debug!(
            panel_id = %data.panel_id(),
            bounds = bounds.len(),
            lipid = lipid.len(),
            differential = differential.len(),
            percentages = percentages.len(),
            estimate = estimate.is_some(),
            duplicates = duplicates.len(),
            historical = historical.len(),
            "Detection layers complete"
        );

        bounds
            .into_iter()
            .chain(lipid)
            .chain(differential)
            .chain(percentages)
            .chain(estimate)
            .chain(duplicates)
            .chain(historical)
            .collect()
    }
}

impl PanelValidator for DefaultPanelValidator {
    fn validate<S>(&self, store: &S, panel_id: &Uuid) -> Result<Vec<ValidationFlag>, ValidationError>
    where
        S: CatalogLookup + PanelHistoryLookup,
    {
        let data = self.load_snapshot(store, panel_id)?;
        let flags = self.validate_snapshot(&data);
        let counts = FlagCounts::from_flags(&flags);

        tracing::info!(
            panel_id = %panel_id,
            measurements = data.current.measurements.len(),
            errors = counts.error,
            warnings = counts.warning,
            auto_corrected = counts.auto_corrected,
            info = counts.info,
            "Detection layers evaluated"
        );

        Ok(flags)
    }

    fn apply_corrections<S>(
        &self,
        store: &S,
        panel_id: &Uuid,
        flags: &mut [ValidationFlag],
    ) -> Result<CorrectionSummary, ValidationError>
    where
        S: CatalogLookup + PanelHistoryLookup + PanelWriter,
    {
        let corrections = proposed_corrections(flags);
        let mut summary = CorrectionSummary::default();
        if corrections.is_empty() {
            return Ok(summary);
        }

        let current = load_panel(store, panel_id)?;
        let gender = store.subject_gender(&current.panel.subject_id)?;
        let stored_codes = store.measurement_codes(panel_id)?;

        for correction in corrections {
            match correction {
                Correction::Overwrite {
                    measurement_id,
                    code,
                    value,
                    ..
                } => {
                    let Some(existing) = current.measurements.iter().find(|m| m.id == measurement_id)
                    else {
                        tracing::warn!(
                            panel_id = %panel_id,
                            biomarker = %code,
                            "Correction target no longer exists, skipping"
                        );
                        continue;
                    };
                    let definition = store
                        .definition(&code)?
                        .ok_or_else(|| ValidationError::CatalogUnavailable(code.clone()))?;

                    let mut updated = existing.clone();
                    updated.set_value(value, &definition, gender);
                    store.update_measurement(&updated)?;
                    summary.updated += 1;

                    tracing::info!(
                        panel_id = %panel_id,
                        biomarker = %code,
                        from = %existing.value,
                        to = %value,
                        "Auto-corrected measurement"
                    );
                }
                Correction::Insert {
                    flag_index,
                    code,
                    value,
                } => {
                    if stored_codes.contains(&code) {
                        tracing::debug!(
                            panel_id = %panel_id,
                            biomarker = %code,
                            "Measurement already present, estimate not inserted"
                        );
                        continue;
                    }
                    let definition = store
                        .definition(&code)?
                        .ok_or_else(|| ValidationError::CatalogUnavailable(code.clone()))?;

                    let inserted = Measurement::new(*panel_id, &definition, gender, value);
                    store.insert_measurement(&inserted)?;
                    flags[flag_index].measurement_id = Some(inserted.id);
                    summary.inserted += 1;

                    tracing::info!(
                        panel_id = %panel_id,
                        biomarker = %code,
                        value = %value,
                        "Inserted estimated measurement"
                    );
                }
            }
        }

        Ok(summary)
    }
}

fn load_panel<S>(store: &S, panel_id: &Uuid) -> Result<PanelSnapshot, ValidationError>
where
    S: PanelHistoryLookup + ?Sized,
{
    let panel = store
        .panel(panel_id)?
        .ok_or(ValidationError::PanelNotFound(*panel_id))?;
    let measurements = store.measurements(panel_id)?;
    Ok(PanelSnapshot {
        panel,
        measurements,
    })
}
