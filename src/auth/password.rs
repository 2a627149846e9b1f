/// Password Hashing and Verification
///
/// Plaintext credentials and their stored bcrypt digests are separate types,
/// so a digest can never be hashed a second time by accident.

use bcrypt::{hash, verify};
use std::fmt;

use crate::error::{AppError, ValidationError};

/// bcrypt only reads the first 72 bytes of its input
const MAX_PASSWORD_BYTES: usize = 72;

/// A secret submitted by a caller. Never persisted, never logged.
#[derive(Clone)]
pub struct PlainCredential(String);

impl PlainCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlainCredential(****)")
    }
}

/// A salted bcrypt digest as stored next to the user record
#[derive(Clone, PartialEq, Eq)]
pub struct HashedCredential(String);

impl HashedCredential {
    /// Wrap a digest loaded from storage
    pub fn from_stored(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedCredential(..)")
    }
}

/// Hash a password using bcrypt
///
/// # Arguments
/// * `password` - Plain text password to hash
/// * `cost` - bcrypt work factor
///
/// # Errors
/// Returns error if:
/// - Password is empty or longer than bcrypt can distinguish
/// - Bcrypt hashing fails
pub fn hash_password(password: &PlainCredential, cost: u32) -> Result<HashedCredential, AppError> {
    if password.is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField("password")));
    }

    // Longer inputs would be silently truncated and collide
    if password.expose().len() > MAX_PASSWORD_BYTES {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password",
            MAX_PASSWORD_BYTES,
        )));
    }

    hash(password.expose(), cost)
        .map(HashedCredential)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a submitted password against a stored hash
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(stored: &HashedCredential, submitted: &PlainCredential) -> bool {
    match verify(submitted.expose(), stored.as_str()) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::debug!("Password verification error: {}", e);
            false
        }
    }
}
