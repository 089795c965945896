//! Panel processing orchestrator.
//!
//! Drives one validation run: status bookkeeping, detection, correction
//! write-back and flag persistence. Storage is reached only through the
//! engine's narrow interfaces, so the same code runs against SQLite and
//! the in-memory store.

use std::time::Instant;

use uuid::Uuid;

use crate::models::enums::PanelStatus;
use crate::models::Panel;
use crate::validation::{
    CatalogLookup, CorrectionSummary, DefaultPanelValidator, FlagCounts, PanelHistoryLookup,
    PanelValidator, PanelWriter, ValidationError, ValidationFlag, ValidationResult,
};

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Validate a panel end to end and persist the outcome.
///
/// 1. Mark the panel `processing`
/// 2. Run every detection layer
/// 3. Append the intake flags of the same run
/// 4. Apply proposed corrections
/// 5. Replace the stored flag set
/// 6. Mark the panel `completed`
///
/// Steps 2 to 6 run as one unit of work on the store. On failure the panel
/// is marked `error` with the message and the error is returned. Runs for
/// the same subject are serialized.
pub fn process_panel<S>(
    engine: &DefaultPanelValidator,
    store: &S,
    panel_id: &Uuid,
    intake_flags: Vec<ValidationFlag>,
) -> Result<ValidationResult, ValidationError>
where
    S: CatalogLookup + PanelHistoryLookup + PanelWriter,
{
    let start = Instant::now();

    let panel = store
        .panel(panel_id)?
        .ok_or(ValidationError::PanelNotFound(*panel_id))?;

    let lock = engine.subject_locks().for_subject(&panel.subject_id)?;
    let outcome = lock
        .lock()
        .map_err(|_| ValidationError::LockFailed)
        .and_then(|_guard| run_locked(engine, store, &panel, intake_flags, start));
    drop(lock);
    engine.subject_locks().release(&panel.subject_id);

    outcome
}

fn run_locked<S>(
    engine: &DefaultPanelValidator,
    store: &S,
    panel: &Panel,
    intake_flags: Vec<ValidationFlag>,
    start: Instant,
) -> Result<ValidationResult, ValidationError>
where
    S: CatalogLookup + PanelHistoryLookup + PanelWriter,
{
    let panel_id = &panel.id;
    store.set_panel_status(panel_id, PanelStatus::Processing, None)?;

    let outcome = store.atomically(|| {
        let (flags, corrections) = run_layers(engine, store, panel_id, intake_flags)?;
        store.set_panel_status(panel_id, PanelStatus::Completed, None)?;
        Ok((flags, corrections))
    });

    match outcome {
        Ok((flags, corrections)) => {
            let counts = FlagCounts::from_flags(&flags);
            let processing_time_ms = start.elapsed().as_millis() as u64;

            tracing::info!(
                panel_id = %panel_id,
                subject_id = %panel.subject_id,
                info = counts.info,
                auto_corrected = counts.auto_corrected,
                warning = counts.warning,
                error = counts.error,
                updated = corrections.updated,
                inserted = corrections.inserted,
                processing_ms = processing_time_ms,
                "Panel validation complete"
            );

            Ok(ValidationResult {
                panel_id: *panel_id,
                flags,
                counts,
                corrections,
                processing_time_ms,
            })
        }
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(panel_id = %panel_id, error = %message, "Panel validation failed");
            if let Err(status_err) =
                store.set_panel_status(panel_id, PanelStatus::Error, Some(&message))
            {
                tracing::warn!(
                    panel_id = %panel_id,
                    error = %status_err,
                    "Could not record panel error status"
                );
            }
            Err(e)
        }
    }
}

fn run_layers<S>(
    engine: &DefaultPanelValidator,
    store: &S,
    panel_id: &Uuid,
    intake_flags: Vec<ValidationFlag>,
) -> Result<(Vec<ValidationFlag>, CorrectionSummary), ValidationError>
where
    S: CatalogLookup + PanelHistoryLookup + PanelWriter,
{
    let mut flags = engine.validate(store, panel_id)?;
    flags.extend(intake_flags);

    let corrections = engine.apply_corrections(store, panel_id, &mut flags)?;
    store.replace_flags(panel_id, &flags)?;

    Ok((flags, corrections))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::enums::{Confidence, FlagCategory, FlagSeverity, Gender};
    use crate::models::{BiomarkerDefinition, Measurement, Panel, ReferenceRange};
    use crate::validation::{FlagDetail, MemoryStore, ValidationConfig};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn def(code: &str) -> BiomarkerDefinition {
        BiomarkerDefinition {
            code: code.into(),
            name: code.into(),
            unit: String::new(),
            category: "Test".into(),
            description: String::new(),
            bounds: None,
            male_range: ReferenceRange::new(Some(dec("1")), Some(dec("5000"))),
            female_range: ReferenceRange::new(Some(dec("1")), Some(dec("5000"))),
            aliases: vec![],
        }
    }

    fn setup(values: &[(&str, &str)]) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        for code in ["WBC", "NEUT", "LYMPH", "MONO", "EOS", "BASO", "HGB"] {
            store.add_definition(def(code)).unwrap();
        }
        let subject = Uuid::new_v4();
        store.add_subject(subject, Some(Gender::Male)).unwrap();
        let panel = Panel::new(subject, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let panel_id = panel.id;
        store.add_panel(panel).unwrap();
        for (code, value) in values {
            let m = Measurement::new(panel_id, &def(code), Gender::Male, dec(value));
            store.insert_measurement(&m).unwrap();
        }
        (store, panel_id)
    }

    fn low_confidence_flag(panel_id: Uuid) -> ValidationFlag {
        ValidationFlag::new(
            panel_id,
            "HGB",
            FlagSeverity::Warning,
            FlagCategory::LowConfidence,
            "HGB matched with low confidence".into(),
            FlagDetail::LowConfidence {
                raw_name: Some("Hb".into()),
                raw_code: None,
                confidence: Confidence::Low,
            },
        )
    }

    #[test]
    fn completes_and_persists_flags_in_order() {
        let (store, panel_id) = setup(&[
            ("WBC", "8000"),
            ("NEUT", "58"),
            ("LYMPH", "30"),
            ("MONO", "8"),
            ("EOS", "4"),
            ("HGB", "14"),
        ]);
        let engine = DefaultPanelValidator::new(ValidationConfig::default());

        let result =
            process_panel(&engine, &store, &panel_id, vec![low_confidence_flag(panel_id)]).unwrap();

        assert_eq!(result.counts.auto_corrected, 4);
        let low_confidence = result
            .flags
            .iter()
            .filter(|f| f.category == FlagCategory::LowConfidence)
            .count();
        assert_eq!(low_confidence, 1);
        assert_eq!(result.corrections, CorrectionSummary { updated: 4, inserted: 1 });
        assert_eq!(result.counts.total(), result.flags.len());

        let stored = store.flags_for(&panel_id).unwrap();
        assert_eq!(stored, result.flags);
        assert_eq!(stored.last().unwrap().category, FlagCategory::LowConfidence);

        let panel = store.panel(&panel_id).unwrap().unwrap();
        assert_eq!(panel.status, PanelStatus::Completed);
    }

    #[test]
    fn reprocessing_replaces_flag_set() {
        let (store, panel_id) = setup(&[("HGB", "250")]);
        let engine = DefaultPanelValidator::new(ValidationConfig::default());

        let first = process_panel(&engine, &store, &panel_id, vec![low_confidence_flag(panel_id)]).unwrap();
        assert_eq!(first.flags.len(), 2);

        let second = process_panel(&engine, &store, &panel_id, Vec::new()).unwrap();
        assert_eq!(second.flags.len(), 1);
        assert_eq!(second.flags[0].category, FlagCategory::Physiological);
        assert_eq!(store.flags_for(&panel_id).unwrap().len(), 1);
    }

    #[test]
    fn missing_panel_is_reported() {
        let store = MemoryStore::new();
        let engine = DefaultPanelValidator::new(ValidationConfig::default());
        let id = Uuid::new_v4();
        let err = process_panel(&engine, &store, &id, Vec::new()).unwrap_err();
        assert!(matches!(err, ValidationError::PanelNotFound(p) if p == id));
    }

    #[test]
    fn failure_marks_panel_error() {
        let (store, panel_id) = setup(&[]);
        let orphan = Measurement::new(panel_id, &def("XYZ"), Gender::Male, dec("1"));
        store.insert_measurement(&orphan).unwrap();
        let engine = DefaultPanelValidator::new(ValidationConfig::default());

        let err = process_panel(&engine, &store, &panel_id, Vec::new()).unwrap_err();
        assert!(matches!(err, ValidationError::CatalogUnavailable(_)));

        let panel = store.panel(&panel_id).unwrap().unwrap();
        assert_eq!(panel.status, PanelStatus::Error);
        assert!(panel.error_message.unwrap().contains("XYZ"));
    }

    #[test]
    fn subject_lock_is_released_after_run() {
        let (store, panel_id) = setup(&[("HGB", "14")]);
        let engine = DefaultPanelValidator::new(ValidationConfig::default());

        process_panel(&engine, &store, &panel_id, Vec::new()).unwrap();
        assert_eq!(engine.subject_locks().tracked(), 0);

        let (store, orphan_panel) = setup(&[]);
        let orphan = Measurement::new(orphan_panel, &def("XYZ"), Gender::Male, dec("1"));
        store.insert_measurement(&orphan).unwrap();
        assert!(process_panel(&engine, &store, &orphan_panel, Vec::new()).is_err());
        assert_eq!(engine.subject_locks().tracked(), 0);
    }
}
