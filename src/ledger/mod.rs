//! Session ledger.
//!
//! Maps a token-id to the identity that owns it, with store-enforced expiry.
//! A token is only usable while its entry exists, so deleting the entry
//! revokes the token before its signed expiration.

mod memory;
mod redis_ledger;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::LedgerError;

pub use self::memory::MemoryLedger;
pub use self::redis_ledger::RedisLedger;

#[async_trait]
pub trait SessionLedger: Send + Sync + 'static {
    /// Record `token_id` as owned by `identity` for `ttl`.
    /// A zero TTL records nothing.
    async fn put(&self, token_id: &Uuid, identity: &Identity, ttl: Duration) -> Result<(), LedgerError>;

    /// Look up the owner of a live entry. Fails with `NotFound` if absent or expired.
    async fn get(&self, token_id: &Uuid) -> Result<Identity, LedgerError>;

    /// Remove an entry, returning how many were removed (0 if absent).
    async fn delete(&self, token_id: &Uuid) -> Result<u64, LedgerError>;
}
