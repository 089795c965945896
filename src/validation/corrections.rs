use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::enums::FlagSeverity;

use super::types::{FlagDetail, ValidationFlag};

/// A measurement change proposed by a flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// Replace the value of an existing measurement.
    Overwrite {
        flag_index: usize,
        measurement_id: Uuid,
        code: String,
        value: Decimal,
    },
    /// Create a measurement that was never extracted.
    Insert {
        flag_index: usize,
        code: String,
        value: Decimal,
    },
}

/// Corrections carried by `flags`, in flag order.
///
/// Auto-corrected flags tied to a measurement overwrite it. Estimate flags
/// not yet tied to a measurement insert one. Every other flag is advisory.
pub fn proposed_corrections(flags: &[ValidationFlag]) -> Vec<Correction> {
    flags
        .iter()
        .enumerate()
        .filter_map(|(flag_index, flag)| {
            let value = flag.corrected_value?;
            match (flag.severity, flag.measurement_id, &flag.detail) {
                (FlagSeverity::AutoCorrected, Some(measurement_id), _) => {
                    Some(Correction::Overwrite {
                        flag_index,
                        measurement_id,
                        code: flag.biomarker_code.clone(),
                        value,
                    })
                }
                (_, None, FlagDetail::Estimate { .. }) => Some(Correction::Insert {
                    flag_index,
                    code: flag.biomarker_code.clone(),
                    value,
                }),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::enums::FlagCategory;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn conversion(code: &str, measurement_id: Uuid, value: &str) -> ValidationFlag {
        let mut flag = ValidationFlag::new(
            Uuid::nil(),
            code,
            FlagSeverity::AutoCorrected,
            FlagCategory::WbcPercentage,
            String::new(),
            FlagDetail::PercentageConversion {
                formula: String::new(),
                percentage: dec("58"),
                total: dec("8000"),
                absolute: dec(value),
            },
        )
        .corrected_to(dec(value));
        flag.measurement_id = Some(measurement_id);
        flag
    }

    fn estimate(value: &str) -> ValidationFlag {
        ValidationFlag::new(
            Uuid::nil(),
            "BASO",
            FlagSeverity::Info,
            FlagCategory::CrossBiomarker,
            String::new(),
            FlagDetail::Estimate {
                formula: String::new(),
                total: dec("8000"),
                component_sum: dec("7960"),
                components: BTreeMap::new(),
                estimate: dec(value),
            },
        )
        .corrected_to(dec(value))
    }

    fn advisory() -> ValidationFlag {
        ValidationFlag::new(
            Uuid::nil(),
            "CT",
            FlagSeverity::Warning,
            FlagCategory::CrossBiomarker,
            String::new(),
            FlagDetail::LipidFormula {
                formula: String::new(),
                expected: dec("170"),
                actual: dec("200"),
                deviation_pct: 17.6,
            },
        )
    }

    #[test]
    fn overwrites_and_insert_in_flag_order() {
        let neut = Uuid::new_v4();
        let flags = vec![advisory(), conversion("NEUT", neut, "4640"), estimate("40")];
        let corrections = proposed_corrections(&flags);
        assert_eq!(
            corrections,
            vec![
                Correction::Overwrite {
                    flag_index: 1,
                    measurement_id: neut,
                    code: "NEUT".into(),
                    value: dec("4640"),
                },
                Correction::Insert {
                    flag_index: 2,
                    code: "BASO".into(),
                    value: dec("40"),
                },
            ]
        );
    }

    #[test]
    fn linked_estimate_is_not_inserted_twice() {
        let mut flag = estimate("40");
        flag.measurement_id = Some(Uuid::new_v4());
        assert!(proposed_corrections(&[flag]).is_empty());
    }

    #[test]
    fn advisory_flags_propose_nothing() {
        assert!(proposed_corrections(&[advisory()]).is_empty());
    }
}
