/// Token claim sets
///
/// Exactly two claim shapes exist: access claims and refresh claims.
/// Both are validated as whole structs at decode time, so a token that is
/// missing a required field never yields partial data.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier (the string form of the user's UUID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for Identity {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which kind of token is being signed or verified.
/// Each kind has its own secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub authorized: bool,
    pub access_uuid: Uuid,
    pub user_id: Identity,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Claims carried by a refresh token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub refresh_uuid: Uuid,
    pub user_id: Identity,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// The identifiers recovered from a presented access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDetails {
    pub access_uuid: Uuid,
    pub user_id: Identity,
}

impl AccessClaims {
    pub fn new(user_id: Identity, exp: i64) -> Self {
        Self {
            authorized: true,
            access_uuid: Uuid::new_v4(),
            user_id,
            exp,
        }
    }

    pub fn details(&self) -> AccessDetails {
        AccessDetails {
            access_uuid: self.access_uuid,
            user_id: self.user_id.clone(),
        }
    }
}

impl RefreshClaims {
    pub fn new(user_id: Identity, exp: i64) -> Self {
        Self {
            refresh_uuid: Uuid::new_v4(),
            user_id,
            exp,
        }
    }
}

/// Either claim shape, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl Claims {
    pub fn kind(&self) -> TokenKind {
        match self {
            Claims::Access(_) => TokenKind::Access,
            Claims::Refresh(_) => TokenKind::Refresh,
        }
    }

    pub fn token_id(&self) -> Uuid {
        match self {
            Claims::Access(c) => c.access_uuid,
            Claims::Refresh(c) => c.refresh_uuid,
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Claims::Access(c) => &c.user_id,
            Claims::Refresh(c) => &c.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_claims_creation() {
        let user = Identity::from(Uuid::new_v4());
        let exp = chrono::Utc::now().timestamp() + 3600;
        let claims = Claims::Access(AccessClaims::new(user.clone(), exp));

        assert_eq!(claims.kind(), TokenKind::Access);
        assert_eq!(claims.identity(), &user);
        match &claims {
            Claims::Access(c) => assert_eq!(claims.token_id(), c.access_uuid),
            Claims::Refresh(_) => panic!("Expected access claims"),
        }
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let user = Identity::new("u1");
        let a = AccessClaims::new(user.clone(), 0);
        let b = AccessClaims::new(user, 0);
        assert_ne!(a.access_uuid, b.access_uuid);
    }

    #[test]
    fn test_access_details() {
        let claims = AccessClaims::new(Identity::new("u1"), 0);
        let details = claims.details();
        assert_eq!(details.access_uuid, claims.access_uuid);
        assert_eq!(details.user_id.as_str(), "u1");
    }

    #[test]
    fn test_missing_field_rejected() {
        let json = r#"{"refresh_uuid":"5f0c3e5c-7f43-4b8e-9a55-2a1f6f0d9c11","exp":1}"#;
        assert!(serde_json::from_str::<RefreshClaims>(json).is_err());
    }

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let json = serde_json::to_string(&Identity::new("abc")).unwrap();
        assert_eq!(json, r#""abc""#);
    }
}
