use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use super::{decimal_text, parse_decimal, parse_opt_decimal, parse_uuid};
use crate::db::DatabaseError;
use crate::models::Measurement;

/// Insert a measurement, or overwrite the value of the existing measurement
/// for the same panel and biomarker (one measurement per code per panel).
pub fn upsert_measurement(conn: &Connection, m: &Measurement) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO measurements (id, panel_id, biomarker_code, value, ref_min, ref_max, is_abnormal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(panel_id, biomarker_code) DO UPDATE SET
            value = excluded.value,
            ref_min = excluded.ref_min,
            ref_max = excluded.ref_max,
            is_abnormal = excluded.is_abnormal",
        params![
            m.id.to_string(),
            m.panel_id.to_string(),
            m.biomarker_code,
            m.value.to_string(),
            decimal_text(m.ref_min),
            decimal_text(m.ref_max),
            m.is_abnormal as i32,
        ],
    )?;
    Ok(())
}

/// Insert a new measurement. A second measurement for the same panel and
/// biomarker is a constraint violation, never an overwrite.
pub fn insert_measurement(conn: &Connection, m: &Measurement) -> Result<(), DatabaseError> {
    let result = conn.execute(
        "INSERT INTO measurements (id, panel_id, biomarker_code, value, ref_min, ref_max, is_abnormal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            m.id.to_string(),
            m.panel_id.to_string(),
            m.biomarker_code,
            m.value.to_string(),
            decimal_text(m.ref_min),
            decimal_text(m.ref_max),
            m.is_abnormal as i32,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, detail)) if e.code == ErrorCode::ConstraintViolation => {
            Err(DatabaseError::ConstraintViolation(format!(
                "cannot insert {} measurement for panel {}: {}",
                m.biomarker_code,
                m.panel_id,
                detail.unwrap_or_else(|| e.to_string())
            )))
        }
        Err(e) => Err(e.into()),
    }
}

/// Write back a changed value together with its recomputed reference snapshot.
pub fn update_measurement_value(conn: &Connection, m: &Measurement) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE measurements SET value = ?1, ref_min = ?2, ref_max = ?3, is_abnormal = ?4
         WHERE id = ?5",
        params![
            m.value.to_string(),
            decimal_text(m.ref_min),
            decimal_text(m.ref_max),
            m.is_abnormal as i32,
            m.id.to_string(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Measurement".into(),
            id: m.id.to_string(),
        });
    }
    Ok(())
}

/// All readable measurements of a panel, ordered by biomarker code.
///
/// A row whose stored value is not a valid decimal is skipped and logged;
/// one malformed value must not make the whole panel unreadable.
pub fn get_measurements_for_panel(
    conn: &Connection,
    panel_id: &Uuid,
) -> Result<Vec<Measurement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, panel_id, biomarker_code, value, ref_min, ref_max, is_abnormal
         FROM measurements WHERE panel_id = ?1 ORDER BY biomarker_code",
    )?;

    let rows = stmt.query_map(params![panel_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, i32>(6)?,
        ))
    })?;

    let mut measurements = Vec::new();
    for row in rows {
        let (id, panel_id, code, value, ref_min, ref_max, is_abnormal) = row?;

        let value = match parse_decimal("value", &value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    panel_id = %panel_id,
                    biomarker = %code,
                    error = %e,
                    "Skipping measurement with malformed value"
                );
                continue;
            }
        };

        measurements.push(Measurement {
            id: parse_uuid(&id)?,
            panel_id: parse_uuid(&panel_id)?,
            biomarker_code: code,
            value,
            ref_min: parse_opt_decimal("ref_min", ref_min)?,
            ref_max: parse_opt_decimal("ref_max", ref_max)?,
            is_abnormal: is_abnormal != 0,
        });
    }
    Ok(measurements)
}

/// Every biomarker code stored for a panel, readable or not.
pub fn get_measurement_codes(conn: &Connection, panel_id: &Uuid) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT biomarker_code FROM measurements WHERE panel_id = ?1 ORDER BY biomarker_code",
    )?;
    let codes = stmt
        .query_map(params![panel_id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{dec, definition, seed_panel, seed_subject};
    use crate::db::repository::upsert_biomarker;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{Gender, PanelStatus};

    #[test]
    fn measurement_insert_and_list_sorted_by_code() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Pending);
        let hgb = definition("HGB", "Hemoglobin");
        let alb = definition("ALB", "Albumin");
        upsert_biomarker(&conn, &hgb).unwrap();
        upsert_biomarker(&conn, &alb).unwrap();

        upsert_measurement(&conn, &Measurement::new(panel.id, &hgb, Gender::Male, dec("14.2"))).unwrap();
        upsert_measurement(&conn, &Measurement::new(panel.id, &alb, Gender::Male, dec("4.1"))).unwrap();

        let list = get_measurements_for_panel(&conn, &panel.id).unwrap();
        let codes: Vec<&str> = list.iter().map(|m| m.biomarker_code.as_str()).collect();
        assert_eq!(codes, vec!["ALB", "HGB"]);
        assert_eq!(list[1].value, dec("14.2"));
    }

    #[test]
    fn upsert_same_code_keeps_single_row() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Pending);
        let def = definition("GLI", "Glucose");
        upsert_biomarker(&conn, &def).unwrap();

        upsert_measurement(&conn, &Measurement::new(panel.id, &def, Gender::Male, dec("90"))).unwrap();
        upsert_measurement(&conn, &Measurement::new(panel.id, &def, Gender::Male, dec("150"))).unwrap();

        let list = get_measurements_for_panel(&conn, &panel.id).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].value, dec("150"));
        assert!(list[0].is_abnormal);
    }

    #[test]
    fn update_value_writes_reference_snapshot() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Pending);
        let def = definition("NEUT", "Neutrophils");
        upsert_biomarker(&conn, &def).unwrap();

        let mut m = Measurement::new(panel.id, &def, Gender::Female, dec("500"));
        upsert_measurement(&conn, &m).unwrap();
        m.set_value(dec("50"), &def, Gender::Female);
        update_measurement_value(&conn, &m).unwrap();

        let loaded = &get_measurements_for_panel(&conn, &panel.id).unwrap()[0];
        assert_eq!(loaded.value, dec("50"));
        assert_eq!(loaded.ref_max, Some(dec("90")));
        assert!(!loaded.is_abnormal);
    }

    #[test]
    fn malformed_value_row_is_skipped() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Pending);
        let good = definition("HGB", "Hemoglobin");
        let bad = definition("HCT", "Hematocrit");
        upsert_biomarker(&conn, &good).unwrap();
        upsert_biomarker(&conn, &bad).unwrap();
        upsert_measurement(&conn, &Measurement::new(panel.id, &good, Gender::Male, dec("14"))).unwrap();
        conn.execute(
            "INSERT INTO measurements (id, panel_id, biomarker_code, value) VALUES (?1, ?2, 'HCT', '4O,2')",
            params![Uuid::new_v4().to_string(), panel.id.to_string()],
        )
        .unwrap();

        let list = get_measurements_for_panel(&conn, &panel.id).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].biomarker_code, "HGB");
    }

    #[test]
    fn insert_rejects_existing_code() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Pending);
        let def = definition("BASO", "Basophils");
        upsert_biomarker(&conn, &def).unwrap();
        conn.execute(
            "INSERT INTO measurements (id, panel_id, biomarker_code, value) VALUES (?1, ?2, 'BASO', 'abc')",
            params![Uuid::new_v4().to_string(), panel.id.to_string()],
        )
        .unwrap();

        let err = insert_measurement(&conn, &Measurement::new(panel.id, &def, Gender::Male, dec("40")))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));

        let raw: String = conn
            .query_row(
                "SELECT value FROM measurements WHERE panel_id = ?1 AND biomarker_code = 'BASO'",
                params![panel.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, "abc");
    }

    #[test]
    fn stored_codes_include_unreadable_rows() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Pending);
        let hgb = definition("HGB", "Hemoglobin");
        upsert_biomarker(&conn, &hgb).unwrap();
        upsert_biomarker(&conn, &definition("HCT", "Hematocrit")).unwrap();
        insert_measurement(&conn, &Measurement::new(panel.id, &hgb, Gender::Male, dec("14"))).unwrap();
        conn.execute(
            "INSERT INTO measurements (id, panel_id, biomarker_code, value) VALUES (?1, ?2, 'HCT', 'n/a')",
            params![Uuid::new_v4().to_string(), panel.id.to_string()],
        )
        .unwrap();

        assert_eq!(get_measurement_codes(&conn, &panel.id).unwrap(), vec!["HCT", "HGB"]);
        assert_eq!(get_measurements_for_panel(&conn, &panel.id).unwrap().len(), 1);
    }
}
