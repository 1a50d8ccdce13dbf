// projection.rs
// Expected collections over a forward window, from one-time and recurring obligations.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::models::{Transaction, TransactionType};

use crate::money::round_cents;

/// Longest forward window a projection may cover (about ten years).
pub const MAX_PROJECTION_DAYS: u32 = 3650;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Projection {
    pub total: f64,
    pub recurring: f64,
    pub one_time: f64,
}

/// Sums what should come in during `(now, now + days]`.
///
/// Recurring transactions contribute their pending amount once per occurrence of
/// their recurrence day inside the window. One-time transactions contribute their
/// pending amount when due on or before the window end (late ones included) or
/// when they have no due date at all. `None` when the window end falls outside
/// the representable calendar.
pub fn project(
    transactions: &[Transaction],
    now: DateTime<Utc>,
    days: u32,
) -> Option<Projection> {
    let end = window_end(now, days)?;
    let mut projection = Projection::default();

    for tx in transactions.iter().filter(|t| !t.status.is_collected()) {
        match tx.transaction_type {
            TransactionType::Recurring => {
                if let Some(day) = tx.recurrence_day {
                    let hits = occurrences_in_window(day, now, days);
                    projection.recurring += hits as f64 * tx.pending_amount;
                }
            }
            TransactionType::OneTime => match tx.due_date {
                Some(due) if due <= end => projection.one_time += tx.pending_amount,
                Some(_) => {}
                None => projection.one_time += tx.pending_amount,
            },
        }
    }

    projection.recurring = round_cents(projection.recurring);
    projection.one_time = round_cents(projection.one_time);
    projection.total = round_cents(projection.recurring + projection.one_time);
    Some(projection)
}

fn window_end(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    now.checked_add_signed(Duration::try_days(i64::from(days))?)
}

/// How many times `day` of the month (00:00 UTC, clamped to short months) falls in
/// `(now, now + days]`.
pub fn occurrences_in_window(day: u32, now: DateTime<Utc>, days: u32) -> usize {
    let Some(end) = window_end(now, days) else {
        return 0;
    };
    let months_to_scan = days.div_ceil(28) + 2;
    let Some(first_of_month) = NaiveDate::from_ymd_opt(now.year(), now.month(), 1) else {
        return 0;
    };

    (0..months_to_scan)
        .filter_map(|i| first_of_month.checked_add_months(Months::new(i)))
        .filter_map(|month_start| {
            let clamped = clamp_day(month_start.year(), month_start.month(), day);
            let date = NaiveDate::from_ymd_opt(month_start.year(), month_start.month(), clamped)?;
            Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()
        })
        .filter(|occurrence| now < *occurrence && *occurrence <= end)
        .count()
}

/// Day of month capped to the month's length (and floored at 1).
pub fn clamp_day(year: i32, month: u32, day: u32) -> u32 {
    if day < 1 {
        return 1;
    }
    let last = last_day_of_month(year, month);
    day.min(last)
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn tx(kind: TransactionType, pending: f64) -> Transaction {
        let now = at(2024, 3, 1);
        Transaction {
            id: "t".into(),
            client_id: "c".into(),
            description: "x".into(),
            extras: Vec::new(),
            total_amount: pending,
            transaction_type: kind,
            recurrence_day: None,
            due_date: None,
            amount_paid: 0.0,
            pending_amount: pending,
            status: TransactionStatus::ToCollect,
            notes: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn recurring_day_counted_per_month_in_window() {
        let mut recurring = tx(TransactionType::Recurring, 30.0);
        recurring.recurrence_day = Some(15);
        let p = project(&[recurring], at(2024, 3, 1), 45).unwrap();
        assert_eq!(p.recurring, 60.0);
        assert_eq!(p.total, 60.0);
    }

    #[test]
    fn occurrence_today_at_midnight_is_excluded() {
        assert_eq!(occurrences_in_window(1, at(2024, 3, 1), 20), 0);
    }

    #[test]
    fn short_months_clamp_to_last_day() {
        // Feb 29 2024 stands in for the 31st.
        assert_eq!(occurrences_in_window(31, at(2024, 2, 1), 28), 1);
        assert_eq!(clamp_day(2023, 2, 31), 28);
        assert_eq!(clamp_day(2024, 12, 31), 31);
    }

    #[test]
    fn long_windows_scan_enough_months() {
        assert_eq!(occurrences_in_window(10, at(2024, 1, 1), 365), 12);
    }

    #[test]
    fn one_time_boundary_is_inclusive() {
        let now = at(2024, 3, 1);
        let mut on_edge = tx(TransactionType::OneTime, 50.0);
        on_edge.due_date = Some(now + Duration::days(30));
        let mut past_edge = tx(TransactionType::OneTime, 70.0);
        past_edge.due_date = Some(now + Duration::days(31));

        let p = project(&[on_edge, past_edge], now, 30).unwrap();
        assert_eq!(p.one_time, 50.0);
    }

    #[test]
    fn one_time_late_and_undated_amounts_are_included() {
        let now = at(2024, 3, 1);
        let mut late = tx(TransactionType::OneTime, 20.0);
        late.due_date = Some(now - Duration::days(90));
        let undated = tx(TransactionType::OneTime, 5.0);

        let p = project(&[late, undated], now, 1).unwrap();
        assert_eq!(p.one_time, 25.0);
    }

    #[test]
    fn windows_past_the_calendar_end_yield_nothing() {
        let mut recurring = tx(TransactionType::Recurring, 30.0);
        recurring.recurrence_day = Some(15);
        let now = at(2024, 3, 1);
        assert_eq!(project(&[recurring], now, u32::MAX), None);
        assert_eq!(occurrences_in_window(15, now, u32::MAX), 0);
        assert_eq!(occurrences_in_window(15, DateTime::<Utc>::MAX_UTC, 1), 0);
    }

    #[test]
    fn recurring_sums_are_settled_to_cents() {
        let mut recurring = tx(TransactionType::Recurring, 0.1);
        recurring.recurrence_day = Some(15);
        let p = project(&[recurring], at(2024, 1, 1), 90).unwrap();
        assert_eq!(p.recurring, 0.3);
        assert_eq!(p.total, 0.3);
    }

    #[test]
    fn collected_transactions_are_ignored() {
        let mut done = tx(TransactionType::OneTime, 0.0);
        done.status = TransactionStatus::Collected;
        done.pending_amount = 40.0;
        assert_eq!(
            project(&[done], at(2024, 3, 1), 30),
            Some(Projection::default())
        );
    }
}
