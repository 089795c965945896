use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{Gender, PanelStatus};
use crate::models::{BiomarkerDefinition, Measurement, Panel};

use super::traits::{CatalogLookup, PanelHistoryLookup, PanelWriter};
use super::types::{ValidationError, ValidationFlag};

/// In-memory store backed by RwLock.
/// Implements the same interfaces as the SQLite store, for embedding
/// applications that keep panels elsewhere and for fixture-driven tests.
#[derive(Default)]
pub struct MemoryStore {
    definitions: RwLock<BTreeMap<String, BiomarkerDefinition>>,
    subjects: RwLock<HashMap<Uuid, Option<Gender>>>,
    panels: RwLock<HashMap<Uuid, Panel>>,
    measurements: RwLock<Vec<Measurement>>,
    flags: RwLock<HashMap<Uuid, Vec<ValidationFlag>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_definition(&self, definition: BiomarkerDefinition) -> Result<(), ValidationError> {
        let mut definitions = self
            .definitions
            .write()
            .map_err(|_| ValidationError::LockFailed)?;
        definitions.insert(definition.code.clone(), definition);
        Ok(())
    }

    pub fn add_subject(&self, subject_id: Uuid, gender: Option<Gender>) -> Result<(), ValidationError> {
        let mut subjects = self.subjects.write().map_err(|_| ValidationError::LockFailed)?;
        subjects.insert(subject_id, gender);
        Ok(())
    }

    pub fn add_panel(&self, panel: Panel) -> Result<(), ValidationError> {
        let mut panels = self.panels.write().map_err(|_| ValidationError::LockFailed)?;
        panels.insert(panel.id, panel);
        Ok(())
    }

    /// Stored flags of a panel, in insertion order.
    pub fn flags_for(&self, panel_id: &Uuid) -> Result<Vec<ValidationFlag>, ValidationError> {
        let flags = self.flags.read().map_err(|_| ValidationError::LockFailed)?;
        Ok(flags.get(panel_id).cloned().unwrap_or_default())
    }

    fn sorted_completed<F>(&self, subject_id: &Uuid, keep: F) -> Result<Vec<Panel>, ValidationError>
    where
        F: Fn(&Panel) -> bool,
    {
        let panels = self.panels.read().map_err(|_| ValidationError::LockFailed)?;
        let mut matching: Vec<Panel> = panels
            .values()
            .filter(|p| {
                p.subject_id == *subject_id && p.status == PanelStatus::Completed && keep(p)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.exam_date
                .cmp(&a.exam_date)
                .then(b.uploaded_at.cmp(&a.uploaded_at))
        });
        Ok(matching)
    }
}

impl CatalogLookup for MemoryStore {
    fn definition(&self, code: &str) -> Result<Option<BiomarkerDefinition>, ValidationError> {
        let definitions = self
            .definitions
            .read()
            .map_err(|_| ValidationError::LockFailed)?;
        Ok(definitions.get(code).cloned())
    }
}

impl PanelHistoryLookup for MemoryStore {
    fn panel(&self, panel_id: &Uuid) -> Result<Option<Panel>, ValidationError> {
        let panels = self.panels.read().map_err(|_| ValidationError::LockFailed)?;
        Ok(panels.get(panel_id).cloned())
    }

    fn subject_gender(&self, subject_id: &Uuid) -> Result<Gender, ValidationError> {
        let subjects = self.subjects.read().map_err(|_| ValidationError::LockFailed)?;
        match subjects.get(subject_id) {
            Some(gender) => Ok(gender.unwrap_or_default()),
            None => Err(DatabaseError::NotFound {
                entity_type: "Subject".into(),
                id: subject_id.to_string(),
            }
            .into()),
        }
    }

    fn measurements(&self, panel_id: &Uuid) -> Result<Vec<Measurement>, ValidationError> {
        let measurements = self
            .measurements
            .read()
            .map_err(|_| ValidationError::LockFailed)?;
        let mut list: Vec<Measurement> = measurements
            .iter()
            .filter(|m| m.panel_id == *panel_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.biomarker_code.cmp(&b.biomarker_code));
        Ok(list)
    }

    fn recent_completed_panels(
        &self,
        subject_id: &Uuid,
        exclude: &Uuid,
        limit: usize,
    ) -> Result<Vec<Panel>, ValidationError> {
        let mut panels = self.sorted_completed(subject_id, |p| p.id != *exclude)?;
        panels.truncate(limit);
        Ok(panels)
    }

    fn previous_completed_panel(
        &self,
        subject_id: &Uuid,
        before: &NaiveDate,
    ) -> Result<Option<Panel>, ValidationError> {
        let panels = self.sorted_completed(subject_id, |p| p.exam_date < *before)?;
        Ok(panels.into_iter().next())
    }
}

impl PanelWriter for MemoryStore {
    fn update_measurement(&self, measurement: &Measurement) -> Result<(), ValidationError> {
        let mut measurements = self
            .measurements
            .write()
            .map_err(|_| ValidationError::LockFailed)?;
        let stored = measurements
            .iter_mut()
            .find(|m| m.id == measurement.id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity_type: "Measurement".into(),
                id: measurement.id.to_string(),
            })?;
        *stored = measurement.clone();
        Ok(())
    }

    fn insert_measurement(&self, measurement: &Measurement) -> Result<(), ValidationError> {
        let mut measurements = self
            .measurements
            .write()
            .map_err(|_| ValidationError::LockFailed)?;
        let duplicate = measurements.iter().any(|m| {
            m.panel_id == measurement.panel_id && m.biomarker_code == measurement.biomarker_code
        });
        if duplicate {
            return Err(DatabaseError::ConstraintViolation(format!(
                "panel {} already has a {} measurement",
                measurement.panel_id, measurement.biomarker_code
            ))
            .into());
        }
        measurements.push(measurement.clone());
        Ok(())
    }

    fn replace_flags(
        &self,
        panel_id: &Uuid,
        flags: &[ValidationFlag],
    ) -> Result<usize, ValidationError> {
        let mut stored = self.flags.write().map_err(|_| ValidationError::LockFailed)?;
        stored.insert(*panel_id, flags.to_vec());
        Ok(flags.len())
    }

    fn set_panel_status(
        &self,
        panel_id: &Uuid,
        status: PanelStatus,
        error_message: Option<&str>,
    ) -> Result<(), ValidationError> {
        let mut panels = self.panels.write().map_err(|_| ValidationError::LockFailed)?;
        let panel = panels
            .get_mut(panel_id)
            .ok_or(ValidationError::PanelNotFound(*panel_id))?;
        panel.status = status;
        panel.error_message = error_message.map(str::to_string);
        Ok(())
    }
}
