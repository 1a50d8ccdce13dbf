use serde::Deserialize;
use tracing::info;

use crate::{
    error::{LedgerError, LedgerResult},
    models::{CLIENTS, Client},
    store::Sort,
};

use super::{Ledger, encode, fetch, find, new_id};

#[derive(Debug, Clone, Deserialize)]
pub struct NewClient {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn create_client(ledger: &Ledger, input: NewClient) -> LedgerResult<Client> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("client name is required"));
    }

    let client = Client {
        id: new_id(),
        name: name.to_string(),
        email: input.email.filter(|e| !e.trim().is_empty()),
        phone: input.phone.filter(|p| !p.trim().is_empty()),
        notes: input.notes,
        created_at: ledger.now(),
    };
    ledger
        .store()
        .set(CLIENTS, &client.id, encode(&client)?)
        .await?;
    info!(client_id = %client.id, "client created");
    Ok(client)
}

pub async fn get_client(ledger: &Ledger, id: &str) -> LedgerResult<Option<Client>> {
    fetch(ledger, CLIENTS, id).await
}

pub async fn list_clients(ledger: &Ledger) -> LedgerResult<Vec<Client>> {
    find(ledger, CLIENTS, &[], Some(Sort::asc("name"))).await
}

/// Removes the client document only; its transactions and payments stay untouched.
pub async fn delete_client(ledger: &Ledger, id: &str) -> LedgerResult<()> {
    if get_client(ledger, id).await?.is_none() {
        return Err(LedgerError::not_found("client", id));
    }
    ledger.store().delete(CLIENTS, id).await?;
    info!(client_id = id, "client deleted");
    Ok(())
}
