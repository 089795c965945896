//! Panel validation and auto-correction engine.
//!
//! Detection layers are pure functions over a [`ValidationSnapshot`]:
//! physiological bounds, cross-biomarker formulas, differential units,
//! duplicate panels and historical consistency. Corrections are proposed as
//! flags and applied separately by [`PanelValidator::apply_corrections`].

pub mod bounds;
pub mod codes;
pub mod config;
pub mod corrections;
pub mod detection;
pub mod engine;
mod helpers;
pub mod messages;
pub mod store;
pub mod summary;
pub mod traits;
pub mod types;

pub use config::ValidationConfig;
pub use engine::{DefaultPanelValidator, SubjectLocks};
pub use messages::MessageTemplates;
pub use store::MemoryStore;
pub use summary::{measurement_status, panel_status, MeasurementStatus, PanelValidationStatus};
pub use traits::{CatalogLookup, PanelHistoryLookup, PanelValidator, PanelWriter};
pub use types::*;
