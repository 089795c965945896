//! Biomarker catalog: bundled reference definitions and database seeding.

use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{repository, DatabaseError};
use crate::models::BiomarkerDefinition;
use crate::validation::ValidationError;

const BUNDLED_CATALOG: &str = include_str!("../resources/biomarkers.json");

/// Outcome of one seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Definitions shipped with the binary.
pub fn bundled_catalog() -> Result<Vec<BiomarkerDefinition>, ValidationError> {
    serde_json::from_str(BUNDLED_CATALOG)
        .map_err(|e| ValidationError::ConfigParse("biomarkers.json".into(), e.to_string()))
}

/// Definitions from a JSON file in the bundled format.
pub fn load_catalog(path: &Path) -> Result<Vec<BiomarkerDefinition>, ValidationError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ValidationError::ConfigLoad(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&json)
        .map_err(|e| ValidationError::ConfigParse(path.display().to_string(), e.to_string()))
}

/// Store `definitions` in one transaction. Existing codes are left alone
/// unless `force` is set.
pub fn seed_catalog(
    conn: &Connection,
    definitions: &[BiomarkerDefinition],
    force: bool,
) -> Result<SeedSummary, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let mut summary = SeedSummary::default();

    for definition in definitions {
        let exists = repository::biomarker_exists(&tx, &definition.code)?;
        if exists && !force {
            summary.skipped += 1;
            continue;
        }
        repository::upsert_biomarker(&tx, definition)?;
        if exists {
            summary.updated += 1;
        } else {
            summary.created += 1;
        }
    }

    tx.commit()?;

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        total = repository::count_biomarkers(conn)?,
        "Biomarker catalog seeded"
    );
    Ok(summary)
}
