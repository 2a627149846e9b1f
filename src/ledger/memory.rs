//! In-process session ledger.
//!
//! Expiry is checked lazily on read, the same observable behaviour as a
//! store with native TTLs. Time comes from `tokio::time`, so paused-clock
//! tests can advance past an entry's lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use super::SessionLedger;
use crate::auth::Identity;
use crate::error::LedgerError;

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<Mutex<HashMap<Uuid, (Identity, Instant)>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing the connection to the store
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|(_, expires)| *expires > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, (Identity, Instant)>>, LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable("connection refused".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| LedgerError::StoreUnavailable("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionLedger for MemoryLedger {
    async fn put(&self, token_id: &Uuid, identity: &Identity, ttl: Duration) -> Result<(), LedgerError> {
        let mut entries = self.entries()?;
        if ttl.is_zero() {
            return Ok(());
        }
        entries.insert(*token_id, (identity.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, token_id: &Uuid) -> Result<Identity, LedgerError> {
        let mut entries = self.entries()?;
        match entries.get(token_id) {
            Some((identity, expires)) if *expires > Instant::now() => Ok(identity.clone()),
            Some(_) => {
                entries.remove(token_id);
                Err(LedgerError::NotFound)
            }
            None => Err(LedgerError::NotFound),
        }
    }

    async fn delete(&self, token_id: &Uuid) -> Result<u64, LedgerError> {
        let mut entries = self.entries()?;
        match entries.remove(token_id) {
            Some((_, expires)) if expires > Instant::now() => Ok(1),
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        let owner = Identity::new("u1");

        ledger.put(&id, &owner, Duration::from_secs(60)).await.unwrap();
        assert_eq!(ledger.get(&id).await, Ok(owner));

        assert_eq!(ledger.delete(&id).await, Ok(1));
        assert_eq!(ledger.get(&id).await, Err(LedgerError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();

        assert_eq!(ledger.delete(&id).await, Ok(0));
        ledger.put(&id, &Identity::new("u1"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(ledger.delete(&id).await, Ok(1));
        assert_eq!(ledger.delete(&id).await, Ok(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        ledger.put(&id, &Identity::new("u1"), Duration::from_millis(500)).await.unwrap();

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(ledger.get(&id).await.is_ok());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(ledger.get(&id).await, Err(LedgerError::NotFound));
        assert_eq!(ledger.delete(&id).await, Ok(0));
    }

    #[tokio::test]
    async fn test_zero_ttl_records_nothing() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        ledger.put(&id, &Identity::new("u1"), Duration::ZERO).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let ledger = MemoryLedger::new();
        ledger.set_available(false);

        let id = Uuid::new_v4();
        let result = ledger.put(&id, &Identity::new("u1"), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LedgerError::StoreUnavailable(_))));
        assert!(matches!(ledger.get(&id).await, Err(LedgerError::StoreUnavailable(_))));

        ledger.set_available(true);
        assert_eq!(ledger.get(&id).await, Err(LedgerError::NotFound));
    }
}
