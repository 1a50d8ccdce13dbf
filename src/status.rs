// status.rs
// Pure derivation of a transaction's lifecycle status.

use chrono::{DateTime, Utc};

use crate::{
    models::{Transaction, TransactionStatus},
    money::{AMOUNT_TOLERANCE, covers},
};

/// Status implied by what has been paid, what is owed and when it was due.
///
/// Paying in full wins over everything; any partial payment wins over lateness;
/// only untouched obligations with a due date in the past are overdue. Amounts
/// within half a cent of each other compare equal.
pub fn derive_status(
    amount_paid: f64,
    total_amount: f64,
    due_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> TransactionStatus {
    if covers(amount_paid, total_amount) {
        TransactionStatus::Collected
    } else if amount_paid > AMOUNT_TOLERANCE {
        TransactionStatus::PartiallyPaid
    } else if due_date.is_some_and(|due| due < now) {
        TransactionStatus::Overdue
    } else {
        TransactionStatus::ToCollect
    }
}

pub fn derive_for(tx: &Transaction, now: DateTime<Utc>) -> TransactionStatus {
    derive_status(tx.amount_paid, tx.total_amount, tx.due_date, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn exact_payment_is_collected() {
        assert_eq!(
            derive_status(100.0, 100.0, None, now()),
            TransactionStatus::Collected
        );
    }

    #[test]
    fn overpayment_is_collected() {
        assert_eq!(
            derive_status(120.0, 100.0, Some(now() - Duration::days(3)), now()),
            TransactionStatus::Collected
        );
    }

    #[test]
    fn partial_payment_beats_lateness() {
        assert_eq!(
            derive_status(10.0, 100.0, Some(now() - Duration::days(3)), now()),
            TransactionStatus::PartiallyPaid
        );
    }

    #[test]
    fn unpaid_past_due_is_overdue() {
        assert_eq!(
            derive_status(0.0, 100.0, Some(now() - Duration::seconds(1)), now()),
            TransactionStatus::Overdue
        );
    }

    #[test]
    fn due_exactly_now_is_not_overdue() {
        assert_eq!(
            derive_status(0.0, 100.0, Some(now()), now()),
            TransactionStatus::ToCollect
        );
    }

    #[test]
    fn no_due_date_is_never_overdue() {
        assert_eq!(
            derive_status(0.0, 100.0, None, now() + Duration::days(3650)),
            TransactionStatus::ToCollect
        );
    }

    #[test]
    fn cent_sums_that_miss_in_binary_still_collect() {
        assert_eq!(
            derive_status(0.7 + 0.2, 0.9, None, now()),
            TransactionStatus::Collected
        );
        assert_eq!(
            derive_status(0.1 + 0.2, 0.3, None, now()),
            TransactionStatus::Collected
        );
        assert_eq!(
            derive_status(0.89, 0.9, None, now()),
            TransactionStatus::PartiallyPaid
        );
    }

    #[test]
    fn zero_total_is_collected_immediately() {
        assert_eq!(
            derive_status(0.0, 0.0, None, now()),
            TransactionStatus::Collected
        );
    }
}
