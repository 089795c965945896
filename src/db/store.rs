use std::collections::BTreeSet;

use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::models::enums::{Gender, PanelStatus};
use crate::models::{BiomarkerDefinition, Measurement, Panel};
use crate::validation::{
    CatalogLookup, PanelHistoryLookup, PanelWriter, ValidationError, ValidationFlag,
};

use super::{repository, DatabaseError};

/// The validation engine's view of the SQLite database.
///
/// `atomically` holds an immediate write lock on the database file, so runs
/// from separate connections or processes never interleave.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }
}

impl CatalogLookup for SqliteStore<'_> {
    fn definition(&self, code: &str) -> Result<Option<BiomarkerDefinition>, ValidationError> {
        Ok(repository::get_biomarker(self.conn, code)?)
    }
}

impl PanelHistoryLookup for SqliteStore<'_> {
    fn panel(&self, panel_id: &Uuid) -> Result<Option<Panel>, ValidationError> {
        Ok(repository::get_panel(self.conn, panel_id)?)
    }

    fn subject_gender(&self, subject_id: &Uuid) -> Result<Gender, ValidationError> {
        Ok(repository::get_subject_gender(self.conn, subject_id)?)
    }

    fn measurements(&self, panel_id: &Uuid) -> Result<Vec<Measurement>, ValidationError> {
        Ok(repository::get_measurements_for_panel(self.conn, panel_id)?)
    }

    fn measurement_codes(&self, panel_id: &Uuid) -> Result<BTreeSet<String>, ValidationError> {
        Ok(repository::get_measurement_codes(self.conn, panel_id)?
            .into_iter()
            .collect())
    }

    fn recent_completed_panels(
        &self,
        subject_id: &Uuid,
        exclude: &Uuid,
        limit: usize,
    ) -> Result<Vec<Panel>, ValidationError> {
        Ok(repository::get_recent_completed_panels(
            self.conn, subject_id, exclude, limit,
        )?)
    }

    fn previous_completed_panel(
        &self,
        subject_id: &Uuid,
        before: &NaiveDate,
    ) -> Result<Option<Panel>, ValidationError> {
        Ok(repository::get_previous_completed_panel(
            self.conn, subject_id, before,
        )?)
    }
}

impl PanelWriter for SqliteStore<'_> {
    fn update_measurement(&self, measurement: &Measurement) -> Result<(), ValidationError> {
        Ok(repository::update_measurement_value(self.conn, measurement)?)
    }

    fn insert_measurement(&self, measurement: &Measurement) -> Result<(), ValidationError> {
        Ok(repository::insert_measurement(self.conn, measurement)?)
    }

    fn replace_flags(
        &self,
        panel_id: &Uuid,
        flags: &[ValidationFlag],
    ) -> Result<usize, ValidationError> {
        Ok(repository::replace_flags(self.conn, panel_id, flags)?)
    }

    fn set_panel_status(
        &self,
        panel_id: &Uuid,
        status: PanelStatus,
        error_message: Option<&str>,
    ) -> Result<(), ValidationError> {
        Ok(repository::update_panel_status(
            self.conn,
            panel_id,
            status,
            error_message,
        )?)
    }

    fn atomically<T, F>(&self, work: F) -> Result<T, ValidationError>
    where
        F: FnOnce() -> Result<T, ValidationError>,
    {
        if !self.conn.is_autocommit() {
            return work();
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let outcome = work()?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(outcome)
    }
}
