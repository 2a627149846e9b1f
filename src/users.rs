/// User record store
///
/// Read-only view of the external user table: look up a user's identity and
/// stored credential digest by email.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_password, HashedCredential, Identity, PlainCredential};
use crate::error::{AppError, CredentialError};

/// What the core needs to know about a user
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub identity: Identity,
    pub hashed_credential: HashedCredential,
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// # Errors
    /// `CredentialError::InvalidUser` if no active user has this email
    async fn find_by_email(&self, email: &str) -> Result<UserRecord, AppError>;
}

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<UserRecord, AppError> {
        let (id, encrypted_password) = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT id, encrypted_password
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CredentialError::InvalidUser)?;

        Ok(UserRecord {
            identity: Identity::from(id),
            hashed_credential: HashedCredential::from_stored(encrypted_password),
        })
    }
}

/// In-process user store.
///
/// Its write path hashes the plaintext credential exactly once before storing it.
#[derive(Debug)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
    bcrypt_cost: u32,
}

impl MemoryUserStore {
    pub fn new(bcrypt_cost: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            bcrypt_cost,
        }
    }

    /// Store a user, returning the identity assigned to it
    pub fn insert(&self, email: &str, password: &PlainCredential) -> Result<Identity, AppError> {
        let record = UserRecord {
            identity: Identity::from(Uuid::new_v4()),
            hashed_credential: hash_password(password, self.bcrypt_cost)?,
        };
        let identity = record.identity.clone();

        self.users
            .write()
            .map_err(|_| AppError::Internal("user store lock poisoned".to_string()))?
            .insert(email.to_string(), record);
        Ok(identity)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<UserRecord, AppError> {
        let users = self
            .users
            .read()
            .map_err(|_| AppError::Internal("user store lock poisoned".to_string()))?;
        users
            .get(email)
            .cloned()
            .ok_or(AppError::Credential(CredentialError::InvalidUser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;

    #[tokio::test]
    async fn test_insert_hashes_credential() {
        let store = MemoryUserStore::new(4);
        let password = PlainCredential::new("s3cret");
        let identity = store.insert("u1@example.com", &password).unwrap();

        let record = store.find_by_email("u1@example.com").await.unwrap();
        assert_eq!(record.identity, identity);
        assert_ne!(record.hashed_credential.as_str(), "s3cret");
        assert!(verify_password(&record.hashed_credential, &password));
    }

    #[tokio::test]
    async fn test_unknown_email_is_invalid_user() {
        let store = MemoryUserStore::new(4);
        let result = store.find_by_email("nobody@example.com").await;
        assert!(matches!(
            result,
            Err(AppError::Credential(CredentialError::InvalidUser))
        ));
    }

    #[test]
    fn test_empty_password_not_stored() {
        let store = MemoryUserStore::new(4);
        assert!(store.insert("u1@example.com", &PlainCredential::new("")).is_err());
    }
}
