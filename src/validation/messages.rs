use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Message template builder for validation flags.
/// Messages state the observed numbers; they never interpret them clinically.
pub struct MessageTemplates;

impl MessageTemplates {
    /// Value outside absolute physiological limits.
    pub fn out_of_bounds(name: &str, value: Decimal, min: Decimal, max: Decimal, unit: &str) -> String {
        let unit = if unit.is_empty() {
            String::new()
        } else {
            format!(" {unit}")
        };
        format!(
            "{}: value {} is outside physiological limits ({}-{}{})",
            name,
            value.normalize(),
            min,
            max,
            unit,
        )
    }

    /// Lipid identity mismatch.
    pub fn lipid_formula(
        actual: Decimal,
        deviation_pct: f64,
        hdl: Decimal,
        ldl: Decimal,
        vldl: Decimal,
        expected: Decimal,
    ) -> String {
        format!(
            "CT={} differs {:.0}% from HDL({}) + LDL({}) + VLDL({}) = {}",
            actual.round(),
            deviation_pct,
            hdl.round(),
            ldl.round(),
            vldl.round(),
            expected.round(),
        )
    }

    /// WBC total does not match its differential.
    pub fn differential_sum(total: Decimal, deviation_pct: f64, component_sum: Decimal) -> String {
        format!(
            "WBC={} differs {:.0}% from the sum of its differential components ({})",
            total.round(),
            deviation_pct,
            component_sum.round(),
        )
    }

    /// Differential component converted from percentage to absolute count.
    pub fn percentage_converted(code: &str, percentage: Decimal, absolute: Decimal, total: Decimal) -> String {
        format!(
            "{}: value {} looks like a percentage. Converted to absolute: {}/mm³ ({}% × WBC {})",
            code,
            percentage.normalize(),
            absolute,
            percentage.normalize(),
            total.round(),
        )
    }

    /// Missing basophil count estimated from the rest of the differential.
    pub fn basophil_estimate(total: Decimal, component_sum: Decimal, estimate: Decimal) -> String {
        format!(
            "BASO estimated: WBC({}) - components({}) = {}/mm³",
            total.round(),
            component_sum.round(),
            estimate,
        )
    }

    /// Panel repeats a prior panel almost value for value.
    pub fn duplicate_panel(
        match_pct: f64,
        prior_date: NaiveDate,
        exact_matches: usize,
        total_compared: usize,
    ) -> String {
        format!(
            "Possible duplicate: {:.0}% of values identical to the exam of {} ({}/{} biomarkers)",
            match_pct,
            prior_date.format("%Y-%m-%d"),
            exact_matches,
            total_compared,
        )
    }

    /// Implausible change since the previous panel.
    pub fn historical_change(
        name: &str,
        change_pct: f64,
        previous: Decimal,
        current: Decimal,
        prior_date: NaiveDate,
    ) -> String {
        format!(
            "{}: {:.0}% change ({} → {}) since {}",
            name,
            change_pct,
            previous.normalize(),
            current.normalize(),
            prior_date.format("%Y-%m-%d"),
        )
    }

    /// Extracted item matched with low confidence.
    pub fn low_confidence(name: &str, raw_name: Option<&str>) -> String {
        match raw_name {
            Some(raw) if !raw.trim().is_empty() => format!(
                "{}: matched from \"{}\" with low confidence, please verify",
                name,
                raw.trim(),
            ),
            _ => format!("{}: extracted with low confidence, please verify", name),
        }
    }

    /// Extracted item with no catalog match.
    pub fn unmatched(raw_name: Option<&str>, raw_code: Option<&str>, raw_value: &str) -> String {
        let label = raw_name
            .filter(|n| !n.trim().is_empty())
            .or(raw_code)
            .unwrap_or("unnamed item");
        format!(
            "\"{}\" (value {}) does not match any known biomarker and was not stored",
            label.trim(),
            raw_value.trim(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn out_of_bounds_message_names_limits() {
        let msg = MessageTemplates::out_of_bounds("Hemoglobin", dec("2.90"), dec("3"), dec("25"), "g/dL");
        assert_eq!(msg, "Hemoglobin: value 2.9 is outside physiological limits (3-25 g/dL)");
    }

    #[test]
    fn out_of_bounds_message_without_unit() {
        let msg = MessageTemplates::out_of_bounds("HGB", dec("30"), dec("3"), dec("25"), "");
        assert!(msg.ends_with("(3-25)"));
    }

    #[test]
    fn lipid_message_rounds_numbers() {
        let msg = MessageTemplates::lipid_formula(dec("200"), 17.647, dec("50"), dec("100"), dec("20"), dec("170"));
        assert_eq!(msg, "CT=200 differs 18% from HDL(50) + LDL(100) + VLDL(20) = 170");
    }

    #[test]
    fn duplicate_message_includes_counts() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let msg = MessageTemplates::duplicate_panel(83.33, date, 5, 6);
        assert!(msg.contains("83%"));
        assert!(msg.contains("2024-03-05"));
        assert!(msg.contains("5/6"));
    }

    #[test]
    fn unmatched_message_falls_back_to_code() {
        let msg = MessageTemplates::unmatched(None, Some("XQZ"), "12");
        assert!(msg.starts_with("\"XQZ\""));
        let msg = MessageTemplates::unmatched(None, None, "12");
        assert!(msg.starts_with("\"unnamed item\""));
    }
}
