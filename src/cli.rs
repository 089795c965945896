//! Command-line surface of the `hemaguard` binary.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use uuid::Uuid;

use crate::catalog;
use crate::config;
use crate::db::{self, repository, DatabaseError, SqliteStore};
use crate::intake::{self, ExtractionReport};
use crate::models::enums::{FlagCategory, Gender};
use crate::models::{Panel, Subject};
use crate::pipeline;
use crate::validation::{panel_status, DefaultPanelValidator, ValidationConfig, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cannot read {0}: {1}")]
    Io(String, String),

    #[error("Invalid extraction file {0}: {1}")]
    InvalidReport(String, String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Parser)]
#[command(name = "hemaguard", version)]
#[command(about = "Validate and auto-correct extracted blood panels")]
pub struct Cli {
    /// SQLite database file (defaults to ~/Hemaguard/hemaguard.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// JSON file overriding validation thresholds and bounds
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the bundled biomarker catalog
    SeedCatalog {
        /// Overwrite definitions that already exist
        #[arg(long)]
        force: bool,
    },
    /// Register a subject and print its id
    AddSubject {
        #[arg(long)]
        name: String,
        /// male or female
        #[arg(long)]
        gender: Option<Gender>,
    },
    /// Create a panel from an extraction JSON file and validate it
    Import {
        #[arg(long)]
        subject: Uuid,
        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        exam_date: NaiveDate,
        file: PathBuf,
    },
    /// Re-run validation on an existing panel
    Validate { panel_id: Uuid },
    /// Print the stored flags of a panel as JSON
    Flags { panel_id: Uuid },
}

/// Run one command and return what should be printed.
pub fn execute(cli: Cli) -> Result<String, CliError> {
    let db_path = cli.db.unwrap_or_else(config::database_path);
    let conn = open(&db_path)?;

    match cli.command {
        Command::SeedCatalog { force } => {
            let definitions = catalog::bundled_catalog()?;
            let summary = catalog::seed_catalog(&conn, &definitions, force)?;
            Ok(format!(
                "Biomarkers: {} created, {} updated, {} skipped",
                summary.created, summary.updated, summary.skipped
            ))
        }
        Command::AddSubject { name, gender } => {
            let subject = Subject {
                id: Uuid::new_v4(),
                display_name: name,
                gender,
            };
            repository::insert_subject(&conn, &subject)?;
            tracing::info!(subject_id = %subject.id, "Subject registered");
            Ok(subject.id.to_string())
        }
        Command::Import {
            subject,
            exam_date,
            file,
        } => {
            let engine = engine(cli.config.as_deref())?;
            let report = read_report(&file)?;
            import_panel(&conn, &engine, subject, exam_date, report)
        }
        Command::Validate { panel_id } => {
            let engine = engine(cli.config.as_deref())?;
            let carried: Vec<_> = repository::get_flags_for_panel(&conn, &panel_id)?
                .into_iter()
                .filter(|f| {
                    matches!(f.category, FlagCategory::LowConfidence | FlagCategory::Unmatched)
                })
                .collect();
            let store = SqliteStore::new(&conn);
            let result = pipeline::process_panel(&engine, &store, &panel_id, carried)?;
            Ok(serde_json::to_string_pretty(&result)?)
        }
        Command::Flags { panel_id } => {
            let flags = repository::get_flags_for_panel(&conn, &panel_id)?;
            let output = serde_json::json!({
                "panel_id": panel_id,
                "status": panel_status(&flags).as_str(),
                "flags": flags,
            });
            Ok(serde_json::to_string_pretty(&output)?)
        }
    }
}

fn open(path: &Path) -> Result<Connection, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| CliError::Io(parent.display().to_string(), e.to_string()))?;
    }
    Ok(db::open_database(path)?)
}

fn engine(override_path: Option<&Path>) -> Result<DefaultPanelValidator, CliError> {
    let config = match override_path {
        Some(path) => ValidationConfig::load(path)?,
        None => {
            let default_path = config::validation_config_path();
            if default_path.exists() {
                ValidationConfig::load(&default_path)?
            } else {
                ValidationConfig::default()
            }
        }
    };
    Ok(DefaultPanelValidator::new(config))
}

fn read_report(path: &Path) -> Result<ExtractionReport, CliError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&json)
        .map_err(|e| CliError::InvalidReport(path.display().to_string(), e.to_string()))
}

fn import_panel(
    conn: &Connection,
    engine: &DefaultPanelValidator,
    subject_id: Uuid,
    exam_date: NaiveDate,
    report: ExtractionReport,
) -> Result<String, CliError> {
    let gender = repository::get_subject_gender(conn, &subject_id)?;
    let catalog = repository::get_all_biomarkers(conn)?;
    if catalog.is_empty() {
        return Err(ValidationError::CatalogUnavailable(
            "catalog is empty; run seed-catalog first".into(),
        )
        .into());
    }

    let mut panel = Panel::new(subject_id, exam_date);
    panel.lab_name = report.lab_name.clone();
    repository::insert_panel(conn, &panel)?;

    let outcome = intake::ingest(panel.id, gender, &report.biomarkers, &catalog);
    for measurement in &outcome.measurements {
        repository::upsert_measurement(conn, measurement)?;
    }

    let store = SqliteStore::new(conn);
    let result = pipeline::process_panel(engine, &store, &panel.id, outcome.flags)?;
    Ok(serde_json::to_string_pretty(&result)?)
}
