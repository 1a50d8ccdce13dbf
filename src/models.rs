// models.rs
// Domain models for the ledger collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CLIENTS: &str = "clients";
pub const TRANSACTIONS: &str = "transactions";
pub const PAYMENTS: &str = "payments";
pub const CHARGES: &str = "charges";
pub const BUSINESSES: &str = "businesses";
pub const AUDIT_LOG: &str = "audit_log";

pub const ALL_COLLECTIONS: [&str; 6] =
    [CLIENTS, TRANSACTIONS, PAYMENTS, CHARGES, BUSINESSES, AUDIT_LOG];

/// Lifecycle status of a client transaction. Always derived, never set by callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    ToCollect,
    PartiallyPaid,
    Collected,
    Overdue,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::ToCollect => "to_collect",
            TransactionStatus::PartiallyPaid => "partially_paid",
            TransactionStatus::Collected => "collected",
            TransactionStatus::Overdue => "overdue",
        }
    }

    pub fn is_collected(&self) -> bool {
        matches!(self, TransactionStatus::Collected)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    OneTime,
    Recurring,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::OneTime => "one_time",
            TransactionType::Recurring => "recurring",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    Nfc,
    #[default]
    Cash,
    Transfer,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Membership,
    Purchase,
    Service,
    Session,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Membership => "membership",
            ChargeType::Purchase => "purchase",
            ChargeType::Service => "service",
            ChargeType::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    ToCollect,
    Collected,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::ToCollect => "to_collect",
            ChargeStatus::Collected => "collected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Itemized line folded into a transaction's total at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extra {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub client_id: String,
    pub description: String,
    #[serde(default)]
    pub extras: Vec<Extra>,
    pub total_amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub recurrence_day: Option<u32>,
    #[serde(default, with = "timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    pub amount_paid: f64,
    pub pending_amount: f64,
    pub status: TransactionStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of money received against a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub transaction_id: String,
    pub client_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Business billed through monthly membership charges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Business {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Monthly agreement; zero means no membership.
    #[serde(default)]
    pub recurring_amount: f64,
    pub cutoff_day: u32,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Abono {
    pub amount: f64,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Charge {
    #[serde(rename = "_id")]
    pub id: String,
    pub business_id: String,
    #[serde(rename = "type")]
    pub charge_type: ChargeType,
    pub description: String,
    pub amount: f64,
    pub status: ChargeStatus,
    #[serde(default)]
    pub abonos: Vec<Abono>,
    #[serde(default)]
    pub paid_amount: f64,
    /// Billing period, `YYYY-MM`.
    pub month: String,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub previous_value: Option<serde_json::Value>,
    #[serde(default)]
    pub new_value: Option<serde_json::Value>,
    pub performed_by: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Fixed-width RFC 3339 (millisecond, `Z`) so stored timestamps sort and
/// compare correctly as strings in every store.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de::Error};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_str(&super::format(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| super::parse(&s).map_err(D::Error::custom))
                .transpose()
        }
    }
}
