/// Token pair minting
///
/// Produces a matched access/refresh pair for one identity. Minting has no
/// side effects; recording the pair in the session ledger is the caller's job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, Claims, Identity, RefreshClaims};
use crate::auth::jwt::TokenCodec;
use crate::configuration::JwtSettings;
use crate::error::{ConfigError, TokenError};

/// A freshly minted access/refresh pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub access_uuid: Uuid,
    pub refresh_uuid: Uuid,
    /// Access token expiration (Unix timestamp)
    pub at_expires: i64,
    /// Refresh token expiration (Unix timestamp)
    pub rt_expires: i64,
}

#[derive(Debug)]
pub struct TokenMinter {
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenMinter {
    pub fn new(codec: TokenCodec, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            codec,
            access_ttl,
            refresh_ttl,
        }
    }

    /// # Errors
    /// `ConfigError::InvalidValue` if a TTL does not fit in a `chrono::Duration`
    pub fn from_settings(config: &JwtSettings) -> Result<Self, ConfigError> {
        let ttl = |secs: i64, name: &str| {
            Duration::try_seconds(secs)
                .ok_or_else(|| ConfigError::InvalidValue(format!("{} out of range", name)))
        };
        Ok(Self::new(
            TokenCodec::from_settings(config),
            ttl(config.access_token_ttl, "ACCESS_TOKEN_TTL")?,
            ttl(config.refresh_token_ttl, "REFRESH_TOKEN_TTL")?,
        ))
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Mint a token pair expiring relative to now
    pub fn mint(&self, identity: &Identity) -> Result<TokenRecord, TokenError> {
        self.mint_at(identity, Utc::now())
    }

    /// Mint a token pair as if issued at `now`
    pub fn mint_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<TokenRecord, TokenError> {
        let access = AccessClaims::new(identity.clone(), expiry(now, self.access_ttl)?);
        let refresh = RefreshClaims::new(identity.clone(), expiry(now, self.refresh_ttl)?);

        let record = TokenRecord {
            access_uuid: access.access_uuid,
            refresh_uuid: refresh.refresh_uuid,
            at_expires: access.exp,
            rt_expires: refresh.exp,
            access_token: self.codec.encode(&Claims::Access(access))?,
            refresh_token: self.codec.encode(&Claims::Refresh(refresh))?,
        };

        tracing::debug!(user_id = %identity, access_uuid = %record.access_uuid, "Token pair minted");
        Ok(record)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, TokenError> {
    now.checked_add_signed(ttl)
        .map(|at| at.timestamp())
        .ok_or_else(|| TokenError::Encode(format!("expiry {} after {} out of range", ttl, now)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> TokenMinter {
        TokenMinter::new(
            TokenCodec::new(b"access-secret", b"refresh-secret"),
            Duration::minutes(60),
            Duration::days(7),
        )
    }

    #[test]
    fn test_mint_pair() {
        let minter = minter();
        let identity = Identity::from(Uuid::new_v4());
        let record = minter.mint(&identity).expect("Failed to mint");

        assert_ne!(record.access_uuid, record.refresh_uuid);
        assert_ne!(record.access_token, record.refresh_token);

        let access = minter.codec().decode_access(&record.access_token).unwrap();
        let refresh = minter.codec().decode_refresh(&record.refresh_token).unwrap();

        assert_eq!(access.user_id, identity);
        assert_eq!(refresh.user_id, identity);
        assert_eq!(access.access_uuid, record.access_uuid);
        assert_eq!(refresh.refresh_uuid, record.refresh_uuid);
        assert_eq!(access.exp, record.at_expires);
        assert_eq!(refresh.exp, record.rt_expires);
    }

    #[test]
    fn test_default_lifetimes() {
        let now = Utc::now();
        let record = minter().mint_at(&Identity::new("u1"), now).unwrap();

        assert_eq!(record.at_expires - now.timestamp(), 60 * 60);
        assert_eq!(record.rt_expires - now.timestamp(), 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_oversized_lifetime_is_an_error() {
        let minter = TokenMinter::new(
            TokenCodec::new(b"access-secret", b"refresh-secret"),
            Duration::minutes(60),
            Duration::days(365 * 1_000_000),
        );

        let result = minter.mint(&Identity::new("u1"));
        assert!(matches!(result, Err(TokenError::Encode(_))));
    }

    #[test]
    fn test_from_settings_rejects_unrepresentable_ttl() {
        let mut config = JwtSettings {
            access_secret: "access-secret".to_string(),
            refresh_secret: "refresh-secret".to_string(),
            access_token_ttl: 3600,
            refresh_token_ttl: i64::MAX,
        };
        assert!(matches!(
            TokenMinter::from_settings(&config),
            Err(ConfigError::InvalidValue(_))
        ));

        // Representable but far beyond any calendar date
        config.refresh_token_ttl = 10_000_000_000_000;
        let minter = TokenMinter::from_settings(&config).unwrap();
        assert!(matches!(
            minter.mint(&Identity::new("u1")),
            Err(TokenError::Encode(_))
        ));
    }

    #[test]
    fn test_consecutive_mints_use_fresh_ids() {
        let minter = minter();
        let identity = Identity::new("u1");
        let a = minter.mint(&identity).unwrap();
        let b = minter.mint(&identity).unwrap();

        assert_ne!(a.access_uuid, b.access_uuid);
        assert_ne!(a.refresh_uuid, b.refresh_uuid);
    }

    #[test]
    fn test_token_minted_in_the_past_is_expired() {
        let minter = minter();
        let issued = Utc::now() - Duration::hours(2);
        let record = minter.mint_at(&Identity::new("u1"), issued).unwrap();

        assert_eq!(
            minter.codec().decode_access(&record.access_token),
            Err(TokenError::Expired)
        );
        // Refresh lifetime is longer, so it is still good
        assert!(minter.codec().decode_refresh(&record.refresh_token).is_ok());
    }
}
