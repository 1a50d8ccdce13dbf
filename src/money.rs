// money.rs
// Amounts are f64 currency units settled to cents. Every stored balance goes
// through `round_cents` and every "is it covered" check uses `AMOUNT_TOLERANCE`.

/// Half a cent: anything closer than this counts as equal.
pub const AMOUNT_TOLERANCE: f64 = 0.005;

pub fn round_cents(amount: f64) -> f64 {
    let rounded = (amount * 100.0).round() / 100.0;
    // -0.0 would serialize as "-0"
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// `paid` settles `due` once it reaches it within the tolerance.
pub fn covers(paid: f64, due: f64) -> bool {
    paid >= due - AMOUNT_TOLERANCE
}

/// `paid` goes past `due` by more than the tolerance.
pub fn exceeds(paid: f64, due: f64) -> bool {
    paid > due + AMOUNT_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cent_sums_settle_exactly() {
        assert_eq!(round_cents(0.7 + 0.2), 0.9);
        assert_eq!(round_cents(0.1 + 0.2), 0.3);
        assert_eq!(round_cents(0.3 - (0.1 + 0.2)), 0.0);
        assert!(round_cents(-1e-17).is_sign_positive());
    }

    #[test]
    fn coverage_ignores_float_noise() {
        assert!(covers(0.7 + 0.2, 0.9));
        assert!(!covers(0.89, 0.9));
        assert!(!exceeds(0.1 + 0.2, 0.3));
        assert!(exceeds(0.31, 0.3));
    }
}
