//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table. All public functions are re-exported here.

mod biomarker;
mod flag;
mod measurement;
mod panel;
mod subject;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::DatabaseError;

pub use biomarker::*;
pub use flag::*;
pub use measurement::*;
pub use panel::*;
pub use subject::*;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_decimal(field: &str, s: &str) -> Result<Decimal, DatabaseError> {
    s.trim().parse::<Decimal>().map_err(|_| DatabaseError::InvalidDecimal {
        field: field.into(),
        value: s.into(),
    })
}

pub(crate) fn parse_opt_decimal(
    field: &str,
    s: Option<String>,
) -> Result<Option<Decimal>, DatabaseError> {
    s.map(|v| parse_decimal(field, &v)).transpose()
}

pub(crate) fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}
