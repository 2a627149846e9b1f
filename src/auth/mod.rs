/// Authentication module
///
/// Handles password hashing/verification, token claims, token signing and
/// verification, and access/refresh pair minting.

mod bearer;
mod claims;
mod jwt;
mod minter;
mod password;

pub use bearer::extract_token;
pub use claims::{AccessClaims, AccessDetails, Claims, Identity, RefreshClaims, TokenKind};
pub use jwt::{decode_token, encode_token, TokenCodec};
pub use minter::{TokenMinter, TokenRecord};
pub use password::{hash_password, verify_password, HashedCredential, PlainCredential};
