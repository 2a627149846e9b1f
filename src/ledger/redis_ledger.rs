//! Redis-backed session ledger.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

use super::SessionLedger;
use crate::auth::Identity;
use crate::configuration::RedisSettings;
use crate::error::LedgerError;

/// Session ledger over a shared, reconnecting Redis connection.
/// Cloning is cheap; all clones share the same connection.
#[derive(Clone)]
pub struct RedisLedger {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisLedger {
    /// Connect once at start-up. The caller decides whether to retry or abort.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, LedgerError> {
        let url = settings.connection_url();
        tracing::info!(url = %mask_redis_url(&url), "Connecting to session store");

        let client = Client::open(url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!("Connected to session store");
        Ok(Self::new(conn, settings.key_prefix.clone()))
    }

    pub fn new(conn: ConnectionManager, key_prefix: String) -> Self {
        Self { conn, key_prefix }
    }

    fn key(&self, token_id: &Uuid) -> String {
        ledger_key(&self.key_prefix, token_id)
    }

    /// Check that the store is reachable
    pub async fn health_check(&self) -> Result<bool, LedgerError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl SessionLedger for RedisLedger {
    async fn put(&self, token_id: &Uuid, identity: &Identity, ttl: Duration) -> Result<(), LedgerError> {
        let Some(millis) = expiry_millis(ttl) else {
            return Ok(());
        };

        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(self.key(token_id), identity.as_str(), millis).await?;
        Ok(())
    }

    async fn get(&self, token_id: &Uuid) -> Result<Identity, LedgerError> {
        let mut conn = self.conn.clone();
        let owner: Option<String> = conn.get(self.key(token_id)).await?;
        owner.map(Identity::new).ok_or(LedgerError::NotFound)
    }

    async fn delete(&self, token_id: &Uuid) -> Result<u64, LedgerError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(self.key(token_id)).await?;
        Ok(removed)
    }
}

fn ledger_key(prefix: &str, token_id: &Uuid) -> String {
    format!("{}{}", prefix, token_id)
}

/// `PSETEX` expiry for `ttl`. `None` below one millisecond: PSETEX rejects
/// a zero expiry and such an entry would already be gone.
fn expiry_millis(ttl: Duration) -> Option<u64> {
    let millis = ttl.as_millis().min(u64::MAX as u128) as u64;
    (millis > 0).then_some(millis)
}

/// Mask password in Redis URL for safe logging.
fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos >= scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}
