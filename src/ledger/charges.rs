// Business-level charges: monthly membership materialization, ad-hoc charges,
// and abonos (partial payments) against a charge.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::{LedgerError, LedgerResult},
    models::{
        Abono, BUSINESSES, Business, CHARGES, Charge, ChargeStatus, ChargeType, timestamp,
    },
    money::{covers, round_cents},
    projection::clamp_day,
    store::{BatchOp, Filter, Sort, StoreError},
};

use super::{
    Ledger, actor_or_default, audit::AuditDraft, encode, ensure_positive, fetch, find, new_id,
    with_conflict_retries,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBusiness {
    pub name: String,
    #[serde(default)]
    pub recurring_amount: f64,
    pub cutoff_day: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCharge {
    pub business_id: String,
    #[serde(rename = "type")]
    pub charge_type: ChargeType,
    pub description: String,
    pub amount: f64,
    /// Billing month `YYYY-MM`; defaults to the current month.
    #[serde(default)]
    pub month: Option<String>,
}

/// First day of a `YYYY-MM` billing month.
pub fn parse_month(raw: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| LedgerError::invalid(format!("month must look like YYYY-MM, got `{raw}`")))
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub async fn create_business(ledger: &Ledger, input: NewBusiness) -> LedgerResult<Business> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("business name is required"));
    }
    if !input.recurring_amount.is_finite() || input.recurring_amount < 0.0 {
        return Err(LedgerError::invalid(
            "recurring_amount must be zero or positive",
        ));
    }
    if !(1..=31).contains(&input.cutoff_day) {
        return Err(LedgerError::invalid(format!(
            "cutoff_day must be between 1 and 31, got {}",
            input.cutoff_day
        )));
    }

    let business = Business {
        id: new_id(),
        name: name.to_string(),
        recurring_amount: round_cents(input.recurring_amount),
        cutoff_day: input.cutoff_day,
        created_at: ledger.now(),
    };
    ledger
        .store()
        .set(BUSINESSES, &business.id, encode(&business)?)
        .await?;
    info!(business_id = %business.id, "business created");
    Ok(business)
}

pub async fn list_businesses(ledger: &Ledger) -> LedgerResult<Vec<Business>> {
    find(ledger, BUSINESSES, &[], Some(Sort::asc("name"))).await
}

pub async fn get_charge(ledger: &Ledger, id: &str) -> LedgerResult<Option<Charge>> {
    fetch(ledger, CHARGES, id).await
}

pub async fn list_charges(ledger: &Ledger, month: &str) -> LedgerResult<Vec<Charge>> {
    let month = month_key(parse_month(month)?);
    find(
        ledger,
        CHARGES,
        &[Filter::eq("month", month)],
        Some(Sort::asc("date")),
    )
    .await
}

/// Generates the missing membership charges of `month` and returns every charge
/// of that month. Businesses that already have one, or have no recurring
/// agreement, are skipped, so calling it again is a no-op.
pub async fn ensure_monthly_memberships(
    ledger: &Ledger,
    businesses: &[Business],
    month: &str,
) -> LedgerResult<Vec<Charge>> {
    let first_day = parse_month(month)?;
    let key = month_key(first_day);

    let existing = list_charges(ledger, &key).await?;
    let billed: HashSet<&str> = existing
        .iter()
        .filter(|c| c.charge_type == ChargeType::Membership)
        .map(|c| c.business_id.as_str())
        .collect();

    let mut ops = Vec::new();
    for business in businesses {
        let agreed = round_cents(business.recurring_amount);
        if !agreed.is_finite() || agreed <= 0.0 || billed.contains(business.id.as_str()) {
            continue;
        }
        let day = clamp_day(first_day.year(), first_day.month(), business.cutoff_day);
        let date = Utc
            .with_ymd_and_hms(first_day.year(), first_day.month(), day, 0, 0, 0)
            .single()
            .ok_or_else(|| LedgerError::invalid(format!("invalid charge date in {key}")))?;

        let charge = Charge {
            id: new_id(),
            business_id: business.id.clone(),
            charge_type: ChargeType::Membership,
            description: format!("Membership {key}"),
            amount: agreed,
            status: ChargeStatus::ToCollect,
            abonos: Vec::new(),
            paid_amount: 0.0,
            month: key.clone(),
            date,
            paid_at: None,
            version: 0,
        };
        ops.push(BatchOp::insert(CHARGES, &charge.id, encode(&charge)?));
    }

    if ops.is_empty() {
        return Ok(existing);
    }

    let created = ops.len();
    match ledger.store().atomic_batch(ops).await {
        Ok(()) => info!(month = %key, created, "membership charges materialized"),
        // Another caller materialized the same month first; its charges win.
        Err(StoreError::Duplicate { .. }) => {
            warn!(month = %key, "membership charges already materialized concurrently")
        }
        Err(err) => return Err(err.into()),
    }
    list_charges(ledger, &key).await
}

/// Loads every business and materializes their memberships for `month`.
pub async fn ensure_memberships_for_all(
    ledger: &Ledger,
    month: &str,
) -> LedgerResult<Vec<Charge>> {
    let businesses = list_businesses(ledger).await?;
    ensure_monthly_memberships(ledger, &businesses, month).await
}

/// Ad-hoc purchase, service or session charge. Memberships only come from
/// [`ensure_monthly_memberships`].
pub async fn create_charge(ledger: &Ledger, input: NewCharge) -> LedgerResult<Charge> {
    if input.charge_type == ChargeType::Membership {
        return Err(LedgerError::invalid(
            "membership charges are generated from business agreements",
        ));
    }
    let amount = round_cents(input.amount);
    ensure_positive(amount, "charge amount")?;
    let description = input.description.trim();
    if description.is_empty() {
        return Err(LedgerError::invalid("description is required"));
    }
    if fetch::<Business>(ledger, BUSINESSES, &input.business_id)
        .await?
        .is_none()
    {
        return Err(LedgerError::not_found("business", &input.business_id));
    }

    let now = ledger.now();
    let month = match input.month.as_deref() {
        Some(raw) => month_key(parse_month(raw)?),
        None => month_key(now.date_naive()),
    };
    let charge = Charge {
        id: new_id(),
        business_id: input.business_id,
        charge_type: input.charge_type,
        description: description.to_string(),
        amount,
        status: ChargeStatus::ToCollect,
        abonos: Vec::new(),
        paid_amount: 0.0,
        month,
        date: now,
        paid_at: None,
        version: 0,
    };
    ledger
        .store()
        .atomic_batch(vec![BatchOp::insert(CHARGES, &charge.id, encode(&charge)?)])
        .await?;
    info!(charge_id = %charge.id, kind = charge.charge_type.as_str(), "charge created");
    Ok(charge)
}

/// Appends a partial payment and marks the charge collected once covered.
pub async fn add_abono(
    ledger: &Ledger,
    charge_id: &str,
    amount: f64,
    performed_by: Option<&str>,
) -> LedgerResult<Charge> {
    let amount = round_cents(amount);
    ensure_positive(amount, "abono amount")?;
    with_conflict_retries(ledger, "charge", charge_id, move || {
        add_abono_once(ledger, charge_id, amount, performed_by)
    })
    .await
}

async fn add_abono_once(
    ledger: &Ledger,
    charge_id: &str,
    amount: f64,
    performed_by: Option<&str>,
) -> LedgerResult<Charge> {
    let before = get_charge(ledger, charge_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("charge", charge_id))?;

    let now = ledger.now();
    let mut charge = before.clone();
    charge.abonos.push(Abono { amount, date: now });
    charge.paid_amount = round_cents(charge.abonos.iter().map(|a| a.amount).sum());
    if covers(charge.paid_amount, charge.amount) {
        charge.status = ChargeStatus::Collected;
        // Keep the first settlement time when abonos keep coming after collection.
        if charge.paid_at.is_none() {
            charge.paid_at = Some(now);
        }
    }
    charge.version = before.version + 1;

    let abonos = charge
        .abonos
        .iter()
        .map(|a| encode(a).map(bson::Bson::from))
        .collect::<LedgerResult<Vec<_>>>()?;
    let status = charge.status.as_str();
    let patch = bson::doc! {
        "abonos": abonos,
        "paid_amount": charge.paid_amount,
        "status": status,
        "paid_at": charge.paid_at.as_ref().map(timestamp::format),
        "version": charge.version,
    };

    let actor = actor_or_default(performed_by);
    let audit = AuditDraft {
        action: "abono_added",
        entity_type: "charge",
        entity_id: charge_id,
        client_id: None,
        previous_value: Some(json!({ "paid_amount": before.paid_amount })),
        new_value: Some(json!({
            "paid_amount": charge.paid_amount,
            "abono_amount": amount,
            "status": status,
        })),
        performed_by: &actor,
    }
    .into_op(now)?;

    ledger
        .store()
        .atomic_batch(vec![
            BatchOp::update_versioned(CHARGES, charge_id, patch, before.version),
            audit,
        ])
        .await?;
    info!(charge_id, amount, paid_amount = charge.paid_amount, "abono added");
    Ok(charge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_keys_are_normalized() {
        assert_eq!(month_key(parse_month("2024-03").unwrap()), "2024-03");
        assert_eq!(month_key(parse_month(" 2024-12 ").unwrap()), "2024-12");
    }

    #[test]
    fn malformed_months_are_rejected() {
        assert!(matches!(
            parse_month("March"),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(parse_month("2024-13").is_err());
    }
}
