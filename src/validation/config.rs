use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::Bounds;

use super::bounds::{default_bounds, default_volatile_codes};
use super::types::ValidationError;

/// Tables and tolerance thresholds used by every validation layer.
///
/// Loaded from JSON, any field left out keeps its default. Entries in
/// `bounds` are merged over the built-in table instead of replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    #[serde(deserialize_with = "merge_over_default_bounds")]
    pub bounds: BTreeMap<String, Bounds>,
    /// Codes skipped by the historical consistency check.
    pub volatile_codes: BTreeSet<String>,

    /// Maximum deviation of CT from HDL + LDL + VLDL, in percent.
    pub lipid_tolerance_pct: f64,

    /// Maximum deviation of WBC from the sum of its differential, in percent.
    pub differential_tolerance_pct: f64,
    pub differential_min_components: usize,

    /// Smallest WBC that is taken to be an absolute count.
    pub wbc_absolute_floor: Decimal,
    pub percentage_min_components: usize,
    /// Every component must be strictly below this to look like a percentage.
    pub percentage_value_ceiling: Decimal,
    /// Exclusive band the component sum must fall in to look like percentages.
    pub percentage_sum_min: Decimal,
    pub percentage_sum_max: Decimal,

    pub duplicate_window: usize,
    pub duplicate_min_common: usize,
    pub duplicate_match_pct: f64,

    pub historical_change_pct: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            bounds: default_bounds(),
            volatile_codes: default_volatile_codes(),
            lipid_tolerance_pct: 15.0,
            differential_tolerance_pct: 10.0,
            differential_min_components: 3,
            wbc_absolute_floor: Decimal::from(1000),
            percentage_min_components: 2,
            percentage_value_ceiling: Decimal::from(100),
            percentage_sum_min: Decimal::from(50),
            percentage_sum_max: Decimal::from(110),
            duplicate_window: 10,
            duplicate_min_common: 5,
            duplicate_match_pct: 80.0,
            historical_change_pct: 200.0,
        }
    }
}

impl ValidationConfig {
    /// Load overrides from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::ConfigLoad(path.display().to_string(), e.to_string())
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            ValidationError::ConfigParse(path.display().to_string(), e.to_string())
        })?;

        tracing::debug!(
            path = %path.display(),
            bounds = config.bounds.len(),
            volatile = config.volatile_codes.len(),
            "Validation config loaded"
        );
        Ok(config)
    }

    /// Physiological limits for a code. The configured table wins over the
    /// catalog definition.
    pub fn bounds_for(&self, code: &str, catalog_bounds: Option<Bounds>) -> Option<Bounds> {
        self.bounds.get(code).copied().or(catalog_bounds)
    }

    pub fn is_volatile(&self, code: &str) -> bool {
        self.volatile_codes.contains(code)
    }
}

fn merge_over_default_bounds<'de, D>(deserializer: D) -> Result<BTreeMap<String, Bounds>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, Bounds>::deserialize(deserializer)?;
    let mut bounds = default_bounds();
    bounds.extend(overrides);
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = ValidationConfig::default();
        assert_eq!(config.lipid_tolerance_pct, 15.0);
        assert_eq!(config.differential_tolerance_pct, 10.0);
        assert_eq!(config.wbc_absolute_floor, Decimal::from(1000));
        assert_eq!(config.duplicate_window, 10);
        assert_eq!(config.duplicate_min_common, 5);
        assert_eq!(config.duplicate_match_pct, 80.0);
        assert_eq!(config.historical_change_pct, 200.0);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "lipid_tolerance_pct": 20.0,
                "bounds": {{ "HGB": {{ "min": "4", "max": "22" }}, "XYZ": {{ "min": 1, "max": 2 }} }}
            }}"#
        )
        .unwrap();

        let config = ValidationConfig::load(file.path()).unwrap();
        assert_eq!(config.lipid_tolerance_pct, 20.0);
        assert_eq!(config.historical_change_pct, 200.0);
        assert_eq!(config.bounds["HGB"].min, Decimal::from(4));
        assert!(config.bounds.contains_key("XYZ"));
        assert!(config.bounds.contains_key("CREA"));
        assert_eq!(config.volatile_codes.len(), 8);
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = ValidationConfig::load(Path::new("/nonexistent/hemaguard.json")).unwrap_err();
        assert!(matches!(err, ValidationError::ConfigLoad(..)));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ValidationConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ValidationError::ConfigParse(..)));
    }

    #[test]
    fn configured_bounds_win_over_catalog() {
        let config = ValidationConfig::default();
        let catalog = Some(Bounds::new(Decimal::from(1), Decimal::from(2)));
        assert_eq!(config.bounds_for("HGB", catalog).unwrap().max, Decimal::from(25));
        assert_eq!(config.bounds_for("NEW", catalog), catalog);
        assert_eq!(config.bounds_for("NEW", None), None);
    }
}
