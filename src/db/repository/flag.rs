use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{decimal_text, parse_opt_decimal, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::validation::types::{FlagDetail, ValidationFlag};

/// Replace the stored flag set of a panel in one transaction.
/// Emission order is kept in the `sequence` column.
///
/// Inside an enclosing transaction the writes join it instead.
pub fn replace_flags(
    conn: &Connection,
    panel_id: &Uuid,
    flags: &[ValidationFlag],
) -> Result<usize, DatabaseError> {
    if !conn.is_autocommit() {
        return write_flags(conn, panel_id, flags);
    }
    let tx = conn.unchecked_transaction()?;
    let written = write_flags(&tx, panel_id, flags)?;
    tx.commit()?;
    Ok(written)
}

fn write_flags(
    conn: &Connection,
    panel_id: &Uuid,
    flags: &[ValidationFlag],
) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM validation_flags WHERE panel_id = ?1",
        params![panel_id.to_string()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO validation_flags
         (id, panel_id, measurement_id, sequence, biomarker_code, severity, category,
          message, original_value, corrected_value, detail_json, resolved)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;

    for (sequence, flag) in flags.iter().enumerate() {
        let detail_json = serde_json::to_string(&flag.detail).map_err(|e| {
            DatabaseError::ConstraintViolation(format!("Cannot encode flag detail for {}: {e}", flag.id))
        })?;
        stmt.execute(params![
            flag.id.to_string(),
            panel_id.to_string(),
            flag.measurement_id.map(|id| id.to_string()),
            sequence as i64,
            flag.biomarker_code,
            flag.severity.as_str(),
            flag.category.as_str(),
            flag.message,
            decimal_text(flag.original_value),
            decimal_text(flag.corrected_value),
            detail_json,
            flag.resolved as i32,
        ])?;
    }

    tracing::debug!(
        panel_id = %panel_id,
        removed,
        inserted = flags.len(),
        "Validation flags replaced"
    );
    Ok(flags.len())
}

/// Stored flags of a panel in emission order.
pub fn get_flags_for_panel(
    conn: &Connection,
    panel_id: &Uuid,
) -> Result<Vec<ValidationFlag>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, panel_id, measurement_id, biomarker_code, severity, category,
                message, original_value, corrected_value, detail_json, resolved
         FROM validation_flags WHERE panel_id = ?1 ORDER BY sequence",
    )?;

    let rows = stmt.query_map(params![panel_id.to_string()], flag_row_from_rusqlite)?;

    let mut flags = Vec::new();
    for row in rows {
        flags.push(flag_from_row(row?)?);
    }
    Ok(flags)
}

/// Mark a single flag as reviewed.
pub fn resolve_flag(conn: &Connection, flag_id: &Uuid) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE validation_flags SET resolved = 1 WHERE id = ?1",
        params![flag_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ValidationFlag".into(),
            id: flag_id.to_string(),
        });
    }
    Ok(())
}

// Internal row type for ValidationFlag mapping
struct FlagRow {
    id: String,
    panel_id: String,
    measurement_id: Option<String>,
    biomarker_code: String,
    severity: String,
    category: String,
    message: String,
    original_value: Option<String>,
    corrected_value: Option<String>,
    detail_json: String,
    resolved: i32,
}

fn flag_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<FlagRow, rusqlite::Error> {
    Ok(FlagRow {
        id: row.get(0)?,
        panel_id: row.get(1)?,
        measurement_id: row.get(2)?,
        biomarker_code: row.get(3)?,
        severity: row.get(4)?,
        category: row.get(5)?,
        message: row.get(6)?,
        original_value: row.get(7)?,
        corrected_value: row.get(8)?,
        detail_json: row.get(9)?,
        resolved: row.get(10)?,
    })
}

fn flag_from_row(row: FlagRow) -> Result<ValidationFlag, DatabaseError> {
    let detail: FlagDetail = serde_json::from_str(&row.detail_json).map_err(|e| {
        DatabaseError::ConstraintViolation(format!("Invalid flag detail for {}: {e}", row.id))
    })?;

    Ok(ValidationFlag {
        id: parse_uuid(&row.id)?,
        panel_id: parse_uuid(&row.panel_id)?,
        measurement_id: row.measurement_id.as_deref().map(parse_uuid).transpose()?,
        biomarker_code: row.biomarker_code,
        severity: FlagSeverity::from_str(&row.severity)?,
        category: FlagCategory::from_str(&row.category)?,
        message: row.message,
        original_value: parse_opt_decimal("original_value", row.original_value)?,
        corrected_value: parse_opt_decimal("corrected_value", row.corrected_value)?,
        detail,
        resolved: row.resolved != 0,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::db::repository::fixtures::{dec, definition, seed_panel, seed_subject};
    use crate::db::repository::{upsert_biomarker, upsert_measurement};
    use crate::db::sqlite::open_memory_database;
    use crate::models::Measurement;

    fn estimate_flag(panel_id: Uuid) -> ValidationFlag {
        ValidationFlag::new(
            panel_id,
            "BASO",
            FlagSeverity::Info,
            FlagCategory::CrossBiomarker,
            "BASO estimated".into(),
            FlagDetail::Estimate {
                formula: "BASO = WBC - (NEUT + LYMPH + MONO + EOS)".into(),
                total: dec("8000"),
                component_sum: dec("7960"),
                components: BTreeMap::from([("NEUT".to_string(), dec("4600"))]),
                estimate: dec("40"),
            },
        )
        .corrected_to(dec("40"))
    }

    fn duplicate_flag(panel_id: Uuid) -> ValidationFlag {
        ValidationFlag::new(
            panel_id,
            "EXAM",
            FlagSeverity::Warning,
            FlagCategory::DuplicateExam,
            "Possible duplicate".into(),
            FlagDetail::DuplicatePanel {
                duplicate_panel_id: Uuid::new_v4(),
                duplicate_exam_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                match_pct: 83.3,
                exact_matches: 5,
                total_compared: 6,
            },
        )
    }

    #[test]
    fn flags_round_trip_in_emission_order() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);

        let flags = vec![duplicate_flag(panel.id), estimate_flag(panel.id)];
        assert_eq!(replace_flags(&conn, &panel.id, &flags).unwrap(), 2);

        let loaded = get_flags_for_panel(&conn, &panel.id).unwrap();
        assert_eq!(loaded, flags);
    }

    #[test]
    fn replace_discards_previous_flags() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);

        replace_flags(&conn, &panel.id, &[duplicate_flag(panel.id), estimate_flag(panel.id)]).unwrap();
        let second = vec![estimate_flag(panel.id)];
        replace_flags(&conn, &panel.id, &second).unwrap();

        let loaded = get_flags_for_panel(&conn, &panel.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, second[0].id);
    }

    #[test]
    fn replace_only_touches_its_panel() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let a = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Completed);
        let b = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);

        replace_flags(&conn, &a.id, &[duplicate_flag(a.id)]).unwrap();
        replace_flags(&conn, &b.id, &[]).unwrap();
        assert_eq!(get_flags_for_panel(&conn, &a.id).unwrap().len(), 1);
    }

    #[test]
    fn flag_linked_to_measurement_is_stored() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);
        let def = definition("BASO", "Basophils");
        upsert_biomarker(&conn, &def).unwrap();
        let m = Measurement::new(panel.id, &def, Gender::Male, dec("40"));
        upsert_measurement(&conn, &m).unwrap();

        let mut flag = estimate_flag(panel.id);
        flag.measurement_id = Some(m.id);
        replace_flags(&conn, &panel.id, &[flag]).unwrap();

        let loaded = get_flags_for_panel(&conn, &panel.id).unwrap();
        assert_eq!(loaded[0].measurement_id, Some(m.id));
    }

    #[test]
    fn resolve_marks_flag() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);
        let flag = duplicate_flag(panel.id);
        replace_flags(&conn, &panel.id, &[flag.clone()]).unwrap();

        resolve_flag(&conn, &flag.id).unwrap();
        assert!(get_flags_for_panel(&conn, &panel.id).unwrap()[0].resolved);

        let err = resolve_flag(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn detail_is_stored_as_tagged_json() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);
        replace_flags(&conn, &panel.id, &[estimate_flag(panel.id)]).unwrap();

        let raw: String = conn
            .query_row(
                "SELECT detail_json FROM validation_flags WHERE panel_id = ?1",
                params![panel.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["kind"], "estimate");
        assert_eq!(json["estimate"], "40");
    }

    #[test]
    fn failed_replace_keeps_previous_flags() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);
        replace_flags(&conn, &panel.id, &[duplicate_flag(panel.id)]).unwrap();

        let mut dangling = estimate_flag(panel.id);
        dangling.measurement_id = Some(Uuid::new_v4());
        assert!(replace_flags(&conn, &panel.id, &[dangling]).is_err());

        let loaded = get_flags_for_panel(&conn, &panel.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].category, FlagCategory::DuplicateExam);
    }

    #[test]
    fn replace_joins_enclosing_transaction() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 6, 1), PanelStatus::Processing);

        {
            let tx = conn.unchecked_transaction().unwrap();
            replace_flags(&tx, &panel.id, &[duplicate_flag(panel.id)]).unwrap();
            tx.rollback().unwrap();
        }
        assert!(get_flags_for_panel(&conn, &panel.id).unwrap().is_empty());

        {
            let tx = conn.unchecked_transaction().unwrap();
            replace_flags(&tx, &panel.id, &[duplicate_flag(panel.id)]).unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(get_flags_for_panel(&conn, &panel.id).unwrap().len(), 1);
    }
}
