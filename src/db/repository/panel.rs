use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::PanelStatus;
use crate::models::Panel;

const PANEL_COLUMNS: &str =
    "id, subject_id, exam_date, lab_name, status, error_message, uploaded_at";

pub fn insert_panel(conn: &Connection, panel: &Panel) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO panels (id, subject_id, exam_date, lab_name, status, error_message, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            panel.id.to_string(),
            panel.subject_id.to_string(),
            panel.exam_date.to_string(),
            panel.lab_name,
            panel.status.as_str(),
            panel.error_message,
            panel.uploaded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_panel(conn: &Connection, id: &Uuid) -> Result<Option<Panel>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PANEL_COLUMNS} FROM panels WHERE id = ?1"),
            params![id.to_string()],
            panel_row_from_rusqlite,
        )
        .optional()?;

    row.map(panel_from_row).transpose()
}

/// Set the processing status. `error_message` is cleared unless given.
pub fn update_panel_status(
    conn: &Connection,
    id: &Uuid,
    status: PanelStatus,
    error_message: Option<&str>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE panels SET status = ?1, error_message = ?2 WHERE id = ?3",
        params![status.as_str(), error_message, id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Panel".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Up to `limit` completed panels of the subject, most recent first,
/// excluding `exclude_id`.
pub fn get_recent_completed_panels(
    conn: &Connection,
    subject_id: &Uuid,
    exclude_id: &Uuid,
    limit: usize,
) -> Result<Vec<Panel>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PANEL_COLUMNS} FROM panels
         WHERE subject_id = ?1 AND status = 'completed' AND id != ?2
         ORDER BY exam_date DESC, uploaded_at DESC
         LIMIT ?3"
    ))?;

    let rows = stmt.query_map(
        params![subject_id.to_string(), exclude_id.to_string(), limit as i64],
        panel_row_from_rusqlite,
    )?;

    let mut panels = Vec::new();
    for row in rows {
        panels.push(panel_from_row(row?)?);
    }
    Ok(panels)
}

/// The most recent completed panel of the subject dated strictly before `before`.
pub fn get_previous_completed_panel(
    conn: &Connection,
    subject_id: &Uuid,
    before: &NaiveDate,
) -> Result<Option<Panel>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {PANEL_COLUMNS} FROM panels
                 WHERE subject_id = ?1 AND status = 'completed' AND exam_date < ?2
                 ORDER BY exam_date DESC, uploaded_at DESC
                 LIMIT 1"
            ),
            params![subject_id.to_string(), before.to_string()],
            panel_row_from_rusqlite,
        )
        .optional()?;

    row.map(panel_from_row).transpose()
}

// Internal row type for Panel mapping
struct PanelRow {
    id: String,
    subject_id: String,
    exam_date: String,
    lab_name: Option<String>,
    status: String,
    error_message: Option<String>,
    uploaded_at: String,
}

fn panel_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PanelRow, rusqlite::Error> {
    Ok(PanelRow {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        exam_date: row.get(2)?,
        lab_name: row.get(3)?,
        status: row.get(4)?,
        error_message: row.get(5)?,
        uploaded_at: row.get(6)?,
    })
}

fn panel_from_row(row: PanelRow) -> Result<Panel, DatabaseError> {
    Ok(Panel {
        id: parse_uuid(&row.id)?,
        subject_id: parse_uuid(&row.subject_id)?,
        exam_date: NaiveDate::parse_from_str(&row.exam_date, "%Y-%m-%d")
            .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid exam_date: {e}")))?,
        lab_name: row.lab_name,
        status: PanelStatus::from_str(&row.status)?,
        error_message: row.error_message,
        uploaded_at: NaiveDateTime::parse_from_str(&row.uploaded_at, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{seed_panel, seed_subject};
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn panel_insert_and_retrieve() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 5, 10), PanelStatus::Pending);

        let loaded = get_panel(&conn, &panel.id).unwrap().unwrap();
        assert_eq!(loaded.subject_id, subject);
        assert_eq!(loaded.exam_date, panel.exam_date);
        assert_eq!(loaded.status, PanelStatus::Pending);
    }

    #[test]
    fn status_update_records_error_message() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let panel = seed_panel(&conn, subject, (2024, 5, 10), PanelStatus::Processing);

        update_panel_status(&conn, &panel.id, PanelStatus::Error, Some("catalog offline")).unwrap();
        let loaded = get_panel(&conn, &panel.id).unwrap().unwrap();
        assert_eq!(loaded.status, PanelStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("catalog offline"));
    }

    #[test]
    fn status_update_on_missing_panel_fails() {
        let conn = open_memory_database().unwrap();
        let err = update_panel_status(&conn, &Uuid::new_v4(), PanelStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn recent_panels_are_completed_newest_first_and_exclude_current() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let other = seed_subject(&conn, None);
        let oldest = seed_panel(&conn, subject, (2023, 1, 1), PanelStatus::Completed);
        let newest = seed_panel(&conn, subject, (2024, 1, 1), PanelStatus::Completed);
        seed_panel(&conn, subject, (2023, 6, 1), PanelStatus::Error);
        seed_panel(&conn, other, (2023, 7, 1), PanelStatus::Completed);
        let current = seed_panel(&conn, subject, (2024, 2, 1), PanelStatus::Completed);

        let recent = get_recent_completed_panels(&conn, &subject, &current.id, 10).unwrap();
        let ids: Vec<Uuid> = recent.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![newest.id, oldest.id]);

        let limited = get_recent_completed_panels(&conn, &subject, &current.id, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, newest.id);
    }

    #[test]
    fn previous_panel_is_strictly_earlier() {
        let conn = open_memory_database().unwrap();
        let subject = seed_subject(&conn, None);
        let earlier = seed_panel(&conn, subject, (2023, 3, 1), PanelStatus::Completed);
        seed_panel(&conn, subject, (2024, 3, 1), PanelStatus::Completed);
        seed_panel(&conn, subject, (2024, 2, 1), PanelStatus::Pending);

        let before = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let previous = get_previous_completed_panel(&conn, &subject, &before).unwrap();
        assert_eq!(previous.map(|p| p.id), Some(earlier.id));

        let first = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert!(get_previous_completed_panel(&conn, &subject, &first).unwrap().is_none());
    }
}
