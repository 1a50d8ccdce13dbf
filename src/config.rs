// config.rs
// Environment-driven configuration (read after dotenvy has loaded `.env`).

use anyhow::{Context, Result, bail};
use std::{env, net::SocketAddr};

pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Mongo,
    Memory,
}

/// What to do when a payment would push `amount_paid` past `total_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverpaymentPolicy {
    /// Refuse the payment as invalid input.
    Reject,
    /// Accept it; `pending_amount` goes negative.
    Allow,
}

impl OverpaymentPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "reject" => Some(OverpaymentPolicy::Reject),
            "allow" => Some(OverpaymentPolicy::Allow),
            _ => None,
        }
    }
}

/// Knobs the ledger itself consults.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub conflict_retries: u32,
    pub overpayment: OverpaymentPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            overpayment: OverpaymentPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub bind_addr: SocketAddr,
    pub ledger: LedgerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let store = match env::var("LEDGER_STORE")
            .unwrap_or_else(|_| "mongo".to_string())
            .to_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StoreKind::Mongo,
            "memory" => StoreKind::Memory,
            other => bail!("LEDGER_STORE must be `mongo` or `memory`, got `{other}`"),
        };

        let mongodb_uri =
            env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let mongodb_db = env::var("MONGODB_DB").unwrap_or_else(|_| "billing".to_string());

        let bind_addr = env::var("LEDGER_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("LEDGER_BIND_ADDR is not a socket address")?;

        let conflict_retries = match env::var("LEDGER_CONFLICT_RETRIES") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .context("LEDGER_CONFLICT_RETRIES must be a non-negative integer")?,
            Err(_) => DEFAULT_CONFLICT_RETRIES,
        };

        let overpayment = match env::var("LEDGER_OVERPAYMENT") {
            Ok(raw) => OverpaymentPolicy::parse(&raw)
                .with_context(|| format!("LEDGER_OVERPAYMENT must be `reject` or `allow`, got `{raw}`"))?,
            Err(_) => OverpaymentPolicy::Reject,
        };

        Ok(Self {
            store,
            mongodb_uri,
            mongodb_db,
            bind_addr,
            ledger: LedgerConfig {
                conflict_retries,
                overpayment,
            },
        })
    }
}
