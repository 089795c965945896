use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::Gender;
use crate::models::Subject;

pub fn insert_subject(conn: &Connection, subject: &Subject) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO subjects (id, display_name, gender) VALUES (?1, ?2, ?3)",
        params![
            subject.id.to_string(),
            subject.display_name,
            subject.gender.map(|g| g.as_str()),
        ],
    )?;
    Ok(())
}

pub fn get_subject(conn: &Connection, id: &Uuid) -> Result<Option<Subject>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, display_name, gender FROM subjects WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, display_name, gender)) => Ok(Some(Subject {
            id: parse_uuid(&id)?,
            display_name,
            gender: gender.map(|g| Gender::from_str(&g)).transpose()?,
        })),
        None => Ok(None),
    }
}

/// Gender used for reference ranges; unknown subjects fall back to the default.
pub fn get_subject_gender(conn: &Connection, id: &Uuid) -> Result<Gender, DatabaseError> {
    let subject = get_subject(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Subject".into(),
        id: id.to_string(),
    })?;
    Ok(subject.gender.unwrap_or_default())
}
