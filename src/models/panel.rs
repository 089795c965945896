use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::biomarker::BiomarkerDefinition;
use super::enums::{Gender, PanelStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub display_name: String,
    pub gender: Option<Gender>,
}

/// One exam occasion for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub exam_date: NaiveDate,
    pub lab_name: Option<String>,
    pub status: PanelStatus,
    pub error_message: Option<String>,
    pub uploaded_at: NaiveDateTime,
}

impl Panel {
    pub fn new(subject_id: Uuid, exam_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            exam_date,
            lab_name: None,
            status: PanelStatus::Pending,
            error_message: None,
            uploaded_at: chrono::Local::now().naive_local(),
        }
    }
}

/// A single biomarker value within a panel.
///
/// `ref_min`, `ref_max` and `is_abnormal` are derived from the catalog
/// definition and the subject's gender; construct through [`Measurement::new`]
/// and mutate through [`Measurement::set_value`] so they never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    pub panel_id: Uuid,
    pub biomarker_code: String,
    pub value: Decimal,
    pub ref_min: Option<Decimal>,
    pub ref_max: Option<Decimal>,
    pub is_abnormal: bool,
}

impl Measurement {
    pub fn new(
        panel_id: Uuid,
        definition: &BiomarkerDefinition,
        gender: Gender,
        value: Decimal,
    ) -> Self {
        let mut measurement = Self {
            id: Uuid::new_v4(),
            panel_id,
            biomarker_code: definition.code.clone(),
            value,
            ref_min: None,
            ref_max: None,
            is_abnormal: false,
        };
        measurement.refresh_reference(definition, gender);
        measurement
    }

    pub fn set_value(&mut self, value: Decimal, definition: &BiomarkerDefinition, gender: Gender) {
        self.value = value;
        self.refresh_reference(definition, gender);
    }

    fn refresh_reference(&mut self, definition: &BiomarkerDefinition, gender: Gender) {
        let range = definition.reference_range(gender);
        self.ref_min = range.min;
        self.ref_max = range.max;
        self.is_abnormal = range.is_outside(self.value);
    }
}
