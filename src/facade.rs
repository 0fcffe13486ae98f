//! Process-wide entry points.
//!
//! Every function here delegates to one [`Client`] that lives for the rest
//! of the process. It is built on first use from [`SessionConfig::from_env`]
//! over an in-process [`MemoryTransport`](crate::MemoryTransport), unless
//! [`install`] supplied one first.

use crate::client::{Client, Delivery, SubscriptionId};
use crate::config::SessionConfig;
use crate::correlation::RequestId;
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::info;

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Use `client` as the process-wide client. Fails if one already exists.
pub fn install(client: Client) -> Result<()> {
    CLIENT
        .set(client)
        .map_err(|_| Error::InvalidConfig("process-wide client is already initialised".into()))?;
    info!("Installed process-wide client");
    Ok(())
}

/// The process-wide client, built on first use.
pub fn client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        info!("Creating process-wide client");
        Client::builder().config(SessionConfig::from_env()).build()
    })
}

pub async fn connect() -> Result<()> {
    client()?.connect().await
}

pub async fn disconnect() -> Result<()> {
    client()?.disconnect().await
}

pub async fn publish<T: Serialize + ?Sized>(topic: &str, payload: &T) -> Result<()> {
    client()?.publish(topic, payload).await
}

pub async fn subscribe<F>(filter: &str, callback: F) -> Result<SubscriptionId>
where
    F: Fn(&Delivery<'_>) + Send + Sync + 'static,
{
    client()?.subscribe(filter, callback).await
}

/// Fresh request id; needs no connection.
pub fn generate_request_id() -> RequestId {
    match client() {
        Ok(client) => client.generate_request_id(),
        Err(_) => RequestId::generate(),
    }
}
