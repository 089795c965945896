use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::models::enums::{FlagCategory, FlagSeverity};
use crate::models::Measurement;

use super::codes::{
    BASO, CT, DIFFERENTIAL, HDL, LDL, PANEL_LEVEL, PRIMARY_DIFFERENTIAL, VLDL, WBC,
};
use super::config::ValidationConfig;
use super::helpers::{checked_sum, deviation_pct, round1};
use super::messages::MessageTemplates;
use super::types::*;

// ---------------------------------------------------------------------------
// [1] Physiological bounds
// ---------------------------------------------------------------------------

/// Flag every value outside its absolute physiological limits.
/// Codes without known limits are skipped.
pub fn detect_out_of_bounds(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
) -> Vec<ValidationFlag> {
    let mut flags = Vec::new();

    for (code, measurement) in data.current.by_code() {
        let catalog_bounds = data.definition(code).and_then(|d| d.bounds);
        let Some(bounds) = config.bounds_for(code, catalog_bounds) else {
            continue;
        };
        if bounds.contains(measurement.value) {
            continue;
        }

        flags.push(
            ValidationFlag::new(
                data.panel_id(),
                code,
                FlagSeverity::Error,
                FlagCategory::Physiological,
                MessageTemplates::out_of_bounds(
                    data.display_name(code),
                    measurement.value,
                    bounds.min,
                    bounds.max,
                    data.unit_of(code),
                ),
                FlagDetail::Physiological {
                    value: measurement.value,
                    absolute_min: bounds.min,
                    absolute_max: bounds.max,
                },
            )
            .for_measurement(measurement),
        );
    }

    flags
}

// ---------------------------------------------------------------------------
// [2] Cross-biomarker formulas
// ---------------------------------------------------------------------------

/// CT should approximate HDL + LDL + VLDL.
pub fn detect_lipid_mismatch(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
) -> Vec<ValidationFlag> {
    let current = &data.current;
    let (Some(ct), Some(hdl), Some(ldl), Some(vldl)) = (
        current.get(CT),
        current.value_of(HDL),
        current.value_of(LDL),
        current.value_of(VLDL),
    ) else {
        return Vec::new();
    };

    let Some(expected) = checked_sum([hdl, ldl, vldl]) else {
        tracing::warn!(panel_id = %data.panel_id(), "Lipid fractions overflow, formula check skipped");
        return Vec::new();
    };
    let Some(deviation) = deviation_pct(ct.value, expected, expected) else {
        return Vec::new();
    };
    if deviation <= config.lipid_tolerance_pct {
        return Vec::new();
    }

    vec![ValidationFlag::new(
        data.panel_id(),
        CT,
        FlagSeverity::Warning,
        FlagCategory::CrossBiomarker,
        MessageTemplates::lipid_formula(ct.value, deviation, hdl, ldl, vldl, expected),
        FlagDetail::LipidFormula {
            formula: "CT = HDL + LDL + VLDL".into(),
            expected,
            actual: ct.value,
            deviation_pct: round1(deviation),
        },
    )
    .for_measurement(ct)]
}

/// WBC should approximate the sum of its differential components.
pub fn detect_differential_mismatch(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
) -> Vec<ValidationFlag> {
    let current = &data.current;
    let Some(wbc) = current.get(WBC) else {
        return Vec::new();
    };

    let components: BTreeMap<String, Decimal> = DIFFERENTIAL
        .iter()
        .filter_map(|code| current.value_of(code).map(|v| (code.to_string(), v)))
        .collect();
    if components.len() < config.differential_min_components {
        return Vec::new();
    }

    let Some(component_sum) = checked_sum(components.values().copied()) else {
        tracing::warn!(panel_id = %data.panel_id(), "Differential overflows, sum check skipped");
        return Vec::new();
    };
    let Some(deviation) = deviation_pct(wbc.value, component_sum, wbc.value) else {
        return Vec::new();
    };
    if deviation <= config.differential_tolerance_pct {
        return Vec::new();
    }

    vec![ValidationFlag::new(
        data.panel_id(),
        WBC,
        FlagSeverity::Warning,
        FlagCategory::CrossBiomarker,
        MessageTemplates::differential_sum(wbc.value, deviation, component_sum),
        FlagDetail::DifferentialSum {
            formula: "WBC = NEUT + LYMPH + MONO + EOS + BASO".into(),
            total: wbc.value,
            component_sum,
            components,
            deviation_pct: round1(deviation),
        },
    )
    .for_measurement(wbc)]
}

// ---------------------------------------------------------------------------
// [3] Differential units
// ---------------------------------------------------------------------------

/// The absolute white-cell count, when it is large enough to be one.
fn absolute_wbc(data: &ValidationSnapshot, config: &ValidationConfig) -> Option<Decimal> {
    data.current
        .value_of(WBC)
        .filter(|total| *total >= config.wbc_absolute_floor)
}

/// Detect a differential stored as percentages and propose absolute counts.
///
/// Either every present primary component is converted or none is.
pub fn detect_percentage_differential(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
) -> Vec<ValidationFlag> {
    let Some(total) = absolute_wbc(data, config) else {
        return Vec::new();
    };

    let present: Vec<&Measurement> = PRIMARY_DIFFERENTIAL
        .iter()
        .filter_map(|code| data.current.get(code))
        .collect();
    if present.len() < config.percentage_min_components {
        return Vec::new();
    }

    let all_small = present
        .iter()
        .all(|m| m.value < config.percentage_value_ceiling);
    let Some(sum) = checked_sum(present.iter().map(|m| m.value)) else {
        tracing::warn!(panel_id = %data.panel_id(), "Differential overflows, unit check skipped");
        return Vec::new();
    };
    let looks_like_pct = sum > config.percentage_sum_min && sum < config.percentage_sum_max;
    if !(all_small && looks_like_pct) {
        return Vec::new();
    }

    let mut converted = Vec::with_capacity(present.len());
    for m in present {
        let Some(absolute) = m
            .value
            .checked_mul(total)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .map(|v| v.round())
        else {
            tracing::warn!(
                panel_id = %data.panel_id(),
                biomarker = %m.biomarker_code,
                "Percentage conversion overflows, differential left unconverted"
            );
            return Vec::new();
        };
        converted.push((m, absolute));
    }

    converted
        .into_iter()
        .map(|(m, absolute)| {
            ValidationFlag::new(
                data.panel_id(),
                &m.biomarker_code,
                FlagSeverity::AutoCorrected,
                FlagCategory::WbcPercentage,
                MessageTemplates::percentage_converted(&m.biomarker_code, m.value, absolute, total),
                FlagDetail::PercentageConversion {
                    formula: format!("{} = round({}% × WBC / 100)", m.biomarker_code, m.biomarker_code),
                    percentage: m.value,
                    total,
                    absolute,
                },
            )
            .for_measurement(m)
            .corrected_to(absolute)
        })
        .collect()
}

/// Propose a basophil count when it is missing but the total and the four
/// other components are known.
///
/// Works on the differential as it will be once `percentage_flags` are
/// applied. Requires a catalog definition for the basophil code.
pub fn propose_basophil_estimate(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
    percentage_flags: &[ValidationFlag],
) -> Option<ValidationFlag> {
    if data.has_stored(BASO) || data.definition(BASO).is_none() {
        return None;
    }
    let total = absolute_wbc(data, config)?;

    let projected = |code: &str| {
        percentage_flags
            .iter()
            .find(|f| f.biomarker_code == code)
            .and_then(|f| f.corrected_value)
            .or_else(|| data.current.value_of(code))
    };

    let mut components = BTreeMap::new();
    for code in PRIMARY_DIFFERENTIAL {
        components.insert(code.to_string(), projected(code)?);
    }

    let Some(component_sum) = checked_sum(components.values().copied()) else {
        tracing::warn!(panel_id = %data.panel_id(), "Differential overflows, no basophil estimate");
        return None;
    };
    let Some(difference) = total.checked_sub(component_sum) else {
        tracing::warn!(panel_id = %data.panel_id(), "Basophil estimate overflows, skipped");
        return None;
    };
    let estimate = difference.max(Decimal::ZERO).round();

    Some(
        ValidationFlag::new(
            data.panel_id(),
            BASO,
            FlagSeverity::Info,
            FlagCategory::CrossBiomarker,
            MessageTemplates::basophil_estimate(total, component_sum, estimate),
            FlagDetail::Estimate {
                formula: "BASO = WBC - (NEUT + LYMPH + MONO + EOS)".into(),
                total,
                component_sum,
                components,
                estimate,
            },
        )
        .corrected_to(estimate),
    )
}

// ---------------------------------------------------------------------------
// [4] Duplicate panels
// ---------------------------------------------------------------------------

/// Flag each recent panel that repeats the current one value for value.
pub fn detect_duplicate_panels(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
) -> Vec<ValidationFlag> {
    let current = data.current.by_code();
    let current_codes: BTreeSet<&str> = current.keys().copied().collect();
    let mut flags = Vec::new();

    for prior in data.recent_panels.iter().take(config.duplicate_window) {
        if prior.panel.id == data.panel_id() {
            continue;
        }
        let prior_values = prior.by_code();

        let common: Vec<&str> = current_codes
            .iter()
            .copied()
            .filter(|code| prior_values.contains_key(code))
            .collect();
        if common.len() < config.duplicate_min_common {
            continue;
        }

        let exact_matches = common
            .iter()
            .filter(|code| current[*code].value == prior_values[*code].value)
            .count();
        let match_pct = exact_matches as f64 / common.len() as f64 * 100.0;
        if match_pct <= config.duplicate_match_pct {
            continue;
        }

        tracing::debug!(
            panel_id = %data.panel_id(),
            prior_panel_id = %prior.panel.id,
            match_pct = round1(match_pct),
            "Possible duplicate panel"
        );

        flags.push(ValidationFlag::new(
            data.panel_id(),
            PANEL_LEVEL,
            FlagSeverity::Warning,
            FlagCategory::DuplicateExam,
            MessageTemplates::duplicate_panel(
                match_pct,
                prior.panel.exam_date,
                exact_matches,
                common.len(),
            ),
            FlagDetail::DuplicatePanel {
                duplicate_panel_id: prior.panel.id,
                duplicate_exam_date: prior.panel.exam_date,
                match_pct: round1(match_pct),
                exact_matches,
                total_compared: common.len(),
            },
        ));
    }

    flags
}

// ---------------------------------------------------------------------------
// [5] Historical consistency
// ---------------------------------------------------------------------------

/// Flag values that moved implausibly since the previous panel.
/// Volatile codes and zero prior values are skipped.
pub fn detect_historical_changes(
    data: &ValidationSnapshot,
    config: &ValidationConfig,
) -> Vec<ValidationFlag> {
    let Some(previous) = &data.previous_panel else {
        return Vec::new();
    };
    let prior_values = previous.by_code();
    let mut flags = Vec::new();

    for (code, measurement) in data.current.by_code() {
        if config.is_volatile(code) {
            continue;
        }
        let Some(prior) = prior_values.get(code) else {
            continue;
        };
        if prior.value.is_zero() {
            continue;
        }
        let Some(change) = deviation_pct(measurement.value, prior.value, prior.value) else {
            continue;
        };
        if change <= config.historical_change_pct {
            continue;
        }

        flags.push(
            ValidationFlag::new(
                data.panel_id(),
                code,
                FlagSeverity::Warning,
                FlagCategory::Historical,
                MessageTemplates::historical_change(
                    data.display_name(code),
                    change,
                    prior.value,
                    measurement.value,
                    previous.panel.exam_date,
                ),
                FlagDetail::Historical {
                    previous_value: prior.value,
                    current_value: measurement.value,
                    change_pct: round1(change),
                    previous_exam_date: previous.panel.exam_date,
                },
            )
            .for_measurement(measurement),
        );
    }

    flags
}
