use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::Gender;

/// Normal range printed on lab reports. Either end may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl ReferenceRange {
    pub fn new(min: Option<Decimal>, max: Option<Decimal>) -> Self {
        Self { min, max }
    }

    /// True when the value falls outside a bound that is present.
    pub fn is_outside(&self, value: Decimal) -> bool {
        self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max)
    }
}

/// Absolute physiological limits. A value outside them is almost certainly
/// a mapping or unit error rather than real physiology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl Bounds {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerDefinition {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub male_range: ReferenceRange,
    #[serde(default)]
    pub female_range: ReferenceRange,
    /// Alternate report names, used only when matching extracted items.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl BiomarkerDefinition {
    pub fn reference_range(&self, gender: Gender) -> &ReferenceRange {
        match gender {
            Gender::Male => &self.male_range,
            Gender::Female => &self.female_range,
        }
    }

    /// Exact, case-insensitive match on name or code.
    pub fn matches_name_or_code(&self, needle: &str) -> bool {
        self.name.to_lowercase() == needle || self.code.to_lowercase() == needle
    }

    /// Exact, case-insensitive match on any alias.
    pub fn matches_alias(&self, needle: &str) -> bool {
        self.aliases
            .iter()
            .any(|alias| alias.trim().to_lowercase() == needle)
    }
}
