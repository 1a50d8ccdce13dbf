// KPI reads. Every figure is a full scan aggregated in-process.

use chrono::Months;
use serde::Serialize;

use crate::{
    error::{LedgerError, LedgerResult},
    models::TransactionStatus,
    money::round_cents,
    projection::{self, MAX_PROJECTION_DAYS, Projection},
};

use super::{Ledger, list_payments, list_transactions, month_key, parse_month};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub month: String,
    pub monthly_income: f64,
    pub pending_total: f64,
    pub overdue_total: f64,
    pub projection_days: u32,
    pub projection: Projection,
}

/// Sum of payments received during the calendar month (UTC).
pub async fn monthly_income(ledger: &Ledger, month: &str) -> LedgerResult<f64> {
    let first_day = parse_month(month)?;
    let next = first_day
        .checked_add_months(Months::new(1))
        .ok_or_else(|| LedgerError::invalid(format!("month {month} is out of range")))?;

    Ok(round_cents(
        list_payments(ledger)
            .await?
            .iter()
            .filter(|p| {
                let day = p.created_at.date_naive();
                day >= first_day && day < next
            })
            .map(|p| p.amount)
            .sum(),
    ))
}

/// Outstanding balance across every transaction not yet collected.
pub async fn pending_total(ledger: &Ledger) -> LedgerResult<f64> {
    Ok(round_cents(
        list_transactions(ledger, None)
            .await?
            .iter()
            .filter(|t| !t.status.is_collected())
            .map(|t| t.pending_amount)
            .sum(),
    ))
}

pub async fn overdue_total(ledger: &Ledger) -> LedgerResult<f64> {
    Ok(round_cents(
        list_transactions(ledger, None)
            .await?
            .iter()
            .filter(|t| t.status == TransactionStatus::Overdue)
            .map(|t| t.pending_amount)
            .sum(),
    ))
}

/// Expected collections over the next `days` days, at most
/// [`MAX_PROJECTION_DAYS`].
pub async fn project(ledger: &Ledger, days: u32) -> LedgerResult<Projection> {
    if days > MAX_PROJECTION_DAYS {
        return Err(LedgerError::invalid(format!(
            "projection window of {days} days exceeds the maximum of {MAX_PROJECTION_DAYS}"
        )));
    }
    let transactions = list_transactions(ledger, None).await?;
    projection::project(&transactions, ledger.now(), days).ok_or_else(|| {
        LedgerError::invalid(format!("projection window of {days} days is out of range"))
    })
}

pub async fn kpi_summary(
    ledger: &Ledger,
    month: Option<&str>,
    days: u32,
) -> LedgerResult<KpiSummary> {
    let month = match month {
        Some(raw) => month_key(parse_month(raw)?),
        None => month_key(ledger.now().date_naive()),
    };

    Ok(KpiSummary {
        monthly_income: monthly_income(ledger, &month).await?,
        pending_total: pending_total(ledger).await?,
        overdue_total: overdue_total(ledger).await?,
        projection_days: days,
        projection: project(ledger, days).await?,
        month,
    })
}
