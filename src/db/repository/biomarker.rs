use rusqlite::{params, Connection, OptionalExtension};

use super::{decimal_text, parse_opt_decimal};
use crate::db::DatabaseError;
use crate::models::*;

const BIOMARKER_COLUMNS: &str = "code, name, unit, category, description,
         absolute_min, absolute_max, ref_min_male, ref_max_male,
         ref_min_female, ref_max_female, aliases";

/// Insert a definition, replacing any existing row with the same code.
pub fn upsert_biomarker(conn: &Connection, def: &BiomarkerDefinition) -> Result<(), DatabaseError> {
    let aliases_json = serde_json::to_string(&def.aliases).unwrap_or_else(|_| "[]".to_string());

    conn.execute(
        "INSERT INTO biomarkers (code, name, unit, category, description,
         absolute_min, absolute_max, ref_min_male, ref_max_male,
         ref_min_female, ref_max_female, aliases)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(code) DO UPDATE SET
            name = excluded.name,
            unit = excluded.unit,
            category = excluded.category,
            description = excluded.description,
            absolute_min = excluded.absolute_min,
            absolute_max = excluded.absolute_max,
            ref_min_male = excluded.ref_min_male,
            ref_max_male = excluded.ref_max_male,
            ref_min_female = excluded.ref_min_female,
            ref_max_female = excluded.ref_max_female,
            aliases = excluded.aliases",
        params![
            def.code,
            def.name,
            def.unit,
            def.category,
            def.description,
            decimal_text(def.bounds.map(|b| b.min)),
            decimal_text(def.bounds.map(|b| b.max)),
            decimal_text(def.male_range.min),
            decimal_text(def.male_range.max),
            decimal_text(def.female_range.min),
            decimal_text(def.female_range.max),
            aliases_json,
        ],
    )?;
    Ok(())
}

pub fn get_biomarker(conn: &Connection, code: &str) -> Result<Option<BiomarkerDefinition>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {BIOMARKER_COLUMNS} FROM biomarkers WHERE code = ?1"),
            params![code],
            biomarker_row_from_rusqlite,
        )
        .optional()?;

    row.map(biomarker_from_row).transpose()
}

pub fn get_all_biomarkers(conn: &Connection) -> Result<Vec<BiomarkerDefinition>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BIOMARKER_COLUMNS} FROM biomarkers ORDER BY category, name"
    ))?;

    let rows = stmt.query_map([], biomarker_row_from_rusqlite)?;

    let mut defs = Vec::new();
    for row in rows {
        defs.push(biomarker_from_row(row?)?);
    }
    Ok(defs)
}

pub fn biomarker_exists(conn: &Connection, code: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM biomarkers WHERE code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_biomarkers(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM biomarkers", [], |row| row.get(0))?;
    Ok(count)
}

// Internal row type for BiomarkerDefinition mapping
struct BiomarkerRow {
    code: String,
    name: String,
    unit: String,
    category: String,
    description: String,
    absolute_min: Option<String>,
    absolute_max: Option<String>,
    ref_min_male: Option<String>,
    ref_max_male: Option<String>,
    ref_min_female: Option<String>,
    ref_max_female: Option<String>,
    aliases: String,
}

fn biomarker_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<BiomarkerRow, rusqlite::Error> {
    Ok(BiomarkerRow {
        code: row.get(0)?,
        name: row.get(1)?,
        unit: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        absolute_min: row.get(5)?,
        absolute_max: row.get(6)?,
        ref_min_male: row.get(7)?,
        ref_max_male: row.get(8)?,
        ref_min_female: row.get(9)?,
        ref_max_female: row.get(10)?,
        aliases: row.get(11)?,
    })
}

fn biomarker_from_row(row: BiomarkerRow) -> Result<BiomarkerDefinition, DatabaseError> {
    let absolute_min = parse_opt_decimal("absolute_min", row.absolute_min)?;
    let absolute_max = parse_opt_decimal("absolute_max", row.absolute_max)?;
    let bounds = match (absolute_min, absolute_max) {
        (Some(min), Some(max)) => Some(Bounds::new(min, max)),
        _ => None,
    };

    Ok(BiomarkerDefinition {
        code: row.code,
        name: row.name,
        unit: row.unit,
        category: row.category,
        description: row.description,
        bounds,
        male_range: ReferenceRange::new(
            parse_opt_decimal("ref_min_male", row.ref_min_male)?,
            parse_opt_decimal("ref_max_male", row.ref_max_male)?,
        ),
        female_range: ReferenceRange::new(
            parse_opt_decimal("ref_min_female", row.ref_min_female)?,
            parse_opt_decimal("ref_max_female", row.ref_max_female)?,
        ),
        aliases: serde_json::from_str(&row.aliases).unwrap_or_default(),
    })
}
