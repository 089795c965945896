use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// `|a - b| / base * 100` as a float. `None` when `base` is not positive,
/// the difference overflows or a value does not fit in an f64.
pub(crate) fn deviation_pct(a: Decimal, b: Decimal, base: Decimal) -> Option<f64> {
    if base <= Decimal::ZERO {
        return None;
    }
    let diff = a.checked_sub(b)?.abs().to_f64()?;
    let base = base.to_f64()?;
    Some(diff / base * 100.0)
}

/// Sum without overflow. `None` when the total is out of range.
pub(crate) fn checked_sum<I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
}

/// Round to one decimal place for the detail map.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
