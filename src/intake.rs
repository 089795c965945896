//! Turns the extraction step's raw item list into panel measurements.
//!
//! Matching is exact only: code, then name or code, then alias. No partial
//! or substring matching.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{Confidence, FlagCategory, FlagSeverity, Gender};
use crate::models::{BiomarkerDefinition, Measurement};
use crate::validation::codes::UNMATCHED;
use crate::validation::{FlagDetail, MessageTemplates, ValidationFlag};

/// One biomarker as reported by the extraction step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "name")]
    pub raw_name: Option<String>,
    /// Number or string, exactly as extracted.
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

impl ExtractedItem {
    pub fn raw_value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn parsed_value(&self) -> Option<Decimal> {
        let text = self.raw_value_text();
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .ok()
    }
}

/// Extraction output for one uploaded report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionReport {
    #[serde(default)]
    pub lab_name: Option<String>,
    #[serde(default)]
    pub biomarkers: Vec<ExtractedItem>,
}

/// Measurements and intake flags for one panel.
#[derive(Debug, Clone, Default)]
pub struct IntakeOutcome {
    /// One measurement per code, in code order.
    pub measurements: Vec<Measurement>,
    /// Low-confidence and unmatched flags, in item order.
    pub flags: Vec<ValidationFlag>,
    pub skipped_values: usize,
}

/// Exact case-insensitive match on name or code first, then on any alias.
pub fn match_by_name<'a>(
    name: &str,
    catalog: &'a [BiomarkerDefinition],
) -> Option<&'a BiomarkerDefinition> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    catalog
        .iter()
        .find(|d| d.matches_name_or_code(&needle))
        .or_else(|| catalog.iter().find(|d| d.matches_alias(&needle)))
}

/// Resolve an item against the catalog. The flag says whether the match
/// should be reported as low confidence.
fn resolve<'a>(
    item: &ExtractedItem,
    catalog: &'a [BiomarkerDefinition],
) -> Option<(&'a BiomarkerDefinition, bool)> {
    let raw_name = item.raw_name.as_deref().unwrap_or("");
    match item.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => match catalog.iter().find(|d| d.code == code) {
            Some(def) => Some((def, item.confidence == Confidence::Low)),
            None => match_by_name(raw_name, catalog).map(|def| (def, true)),
        },
        None => match_by_name(raw_name, catalog).map(|def| (def, false)),
    }
}

pub fn ingest(
    panel_id: Uuid,
    gender: Gender,
    items: &[ExtractedItem],
    catalog: &[BiomarkerDefinition],
) -> IntakeOutcome {
    let mut by_code: BTreeMap<String, Measurement> = BTreeMap::new();
    let mut flags = Vec::new();
    let mut skipped_values = 0;

    for item in items {
        let Some((definition, low_confidence)) = resolve(item, catalog) else {
            tracing::info!(
                raw_name = item.raw_name.as_deref().unwrap_or(""),
                code = item.code.as_deref().unwrap_or(""),
                "No catalog match for extracted item"
            );
            flags.push(ValidationFlag::new(
                panel_id,
                UNMATCHED,
                FlagSeverity::Info,
                FlagCategory::Unmatched,
                MessageTemplates::unmatched(
                    item.raw_name.as_deref(),
                    item.code.as_deref(),
                    &item.raw_value_text(),
                ),
                FlagDetail::Unmatched {
                    raw_name: item.raw_name.clone(),
                    raw_code: item.code.clone(),
                    raw_value: item.raw_value_text(),
                    unit: item.unit.clone(),
                },
            ));
            continue;
        };

        if low_confidence {
            flags.push(ValidationFlag::new(
                panel_id,
                &definition.code,
                FlagSeverity::Warning,
                FlagCategory::LowConfidence,
                MessageTemplates::low_confidence(&definition.name, item.raw_name.as_deref()),
                FlagDetail::LowConfidence {
                    raw_name: item.raw_name.clone(),
                    raw_code: item.code.clone(),
                    confidence: item.confidence,
                },
            ));
        }

        let Some(value) = item.parsed_value() else {
            tracing::warn!(
                biomarker = %definition.code,
                raw_value = %item.raw_value_text(),
                "Invalid extracted value, skipping"
            );
            skipped_values += 1;
            continue;
        };

        by_code.insert(
            definition.code.clone(),
            Measurement::new(panel_id, definition, gender, value),
        );
    }

    tracing::info!(
        panel_id = %panel_id,
        items = items.len(),
        saved = by_code.len(),
        flags = flags.len(),
        "Extraction intake complete"
    );

    IntakeOutcome {
        measurements: by_code.into_values().collect(),
        flags,
        skipped_values,
    }
}
