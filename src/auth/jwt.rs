/// Token encoding and verification
///
/// Signs claim sets with HMAC-SHA-256 and verifies them back. The secret
/// used to verify is chosen by the caller's expectation of the token kind,
/// never by anything inside the (untrusted) token.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::claims::{AccessClaims, Claims, RefreshClaims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::TokenError;

/// Sign a claim set with the given key
///
/// # Errors
/// Returns `TokenError::Encode` if the claims cannot be serialized
pub fn encode_token<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| TokenError::Encode(e.to_string()))
}

/// Verify a token's signature and expiration and extract its claims
///
/// # Errors
/// - `InvalidSignature` if the algorithm is not HMAC or the signature does not verify
/// - `Expired` if the embedded expiration is in the past
/// - `Malformed` if the token or its claims cannot be parsed
pub fn decode_token<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, TokenError> {
    decode::<T>(token, key, &validation())
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat => TokenError::InvalidSignature,
            _ => {
                tracing::debug!("Token parse error: {}", e);
                TokenError::Malformed
            }
        })
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Per-kind signing keys
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
        }
    }

    pub fn from_settings(config: &JwtSettings) -> Self {
        Self::new(config.access_secret.as_bytes(), config.refresh_secret.as_bytes())
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign claims with the secret belonging to their kind
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        let key = &self.keys(claims.kind()).encoding;
        match claims {
            Claims::Access(c) => encode_token(c, key),
            Claims::Refresh(c) => encode_token(c, key),
        }
    }

    /// Decode a token presented as an access token
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = decode_token(token, &self.keys(TokenKind::Access).decoding)?;
        if !claims.authorized || claims.user_id.as_str().is_empty() {
            return Err(TokenError::Malformed);
        }
        Ok(claims)
    }

    /// Decode a token presented as a refresh token
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = decode_token(token, &self.keys(TokenKind::Refresh).decoding)?;
        if claims.user_id.as_str().is_empty() {
            return Err(TokenError::Malformed);
        }
        Ok(claims)
    }

    /// Decode a token of the given kind into the tagged claim set
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        match kind {
            TokenKind::Access => self.decode_access(token).map(Claims::Access),
            TokenKind::Refresh => self.decode_refresh(token).map(Claims::Refresh),
        }
    }
}
