/// Auth Coordinator
///
/// Drives a single request through the token lifecycle:
/// authenticate → mint → persist, and later authorize / revoke / refresh.
/// Holds no per-request state; the session ledger and user store are shared
/// clients injected at start-up.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::{
    extract_token, verify_password, Identity, PlainCredential, TokenKind, TokenMinter, TokenRecord,
};
use crate::error::{AppError, CredentialError, ErrorContext, LedgerError, TokenError};
use crate::ledger::SessionLedger;
use crate::users::UserStore;
use crate::validators::is_valid_email;

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Authenticating,
    Minting,
    Persisting,
    Decoding,
    LedgerLookup,
    Revoking,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Authenticating => "authenticating",
            Stage::Minting => "minting",
            Stage::Persisting => "persisting",
            Stage::Decoding => "decoding",
            Stage::LedgerLookup => "ledger_lookup",
            Stage::Revoking => "revoking",
            Stage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Runs `step` and, on failure, logs it against the stage it failed in
macro_rules! at_stage {
    ($ctx:expr, $stage:expr, $step:expr) => {
        match $step {
            Ok(value) => value,
            Err(err) => {
                let err: AppError = err.into();
                $ctx.log_error($stage, &err);
                return Err(err);
            }
        }
    };
}

pub struct AuthCoordinator {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn SessionLedger>,
    minter: TokenMinter,
}

impl AuthCoordinator {
    pub fn new(users: Arc<dyn UserStore>, ledger: Arc<dyn SessionLedger>, minter: TokenMinter) -> Self {
        Self {
            users,
            ledger,
            minter,
        }
    }

    pub fn minter(&self) -> &TokenMinter {
        &self.minter
    }

    /// Check a user's credentials and issue a recorded token pair
    ///
    /// # Errors
    /// - `Credential(InvalidUser)` if the email is malformed or unknown
    /// - `Credential(InvalidPassword)` if the password does not match
    /// - `SessionNotRecorded` if the pair could not be recorded
    /// - `Internal` if minting fails
    pub async fn authenticate(&self, email: &str, password: PlainCredential) -> Result<TokenRecord, AppError> {
        self.authenticate_with(ErrorContext::new("authenticate"), email, password)
            .await
    }

    /// `authenticate`, logging under the caller's context
    pub async fn authenticate_with(
        &self,
        ctx: ErrorContext,
        email: &str,
        password: PlainCredential,
    ) -> Result<TokenRecord, AppError> {
        tracing::debug!(request_id = %ctx.request_id, stage = %Stage::Received, "Authentication requested");

        let email = at_stage!(
            ctx,
            Stage::Received,
            is_valid_email(email).map_err(|_| CredentialError::InvalidUser)
        );
        let user = at_stage!(ctx, Stage::Received, self.users.find_by_email(&email).await);
        let ctx = ctx.with_user_id(user.identity.to_string());

        // bcrypt verification blocks
        let hashed = user.hashed_credential.clone();
        let verified = at_stage!(
            ctx,
            Stage::Authenticating,
            tokio::task::spawn_blocking(move || verify_password(&hashed, &password))
                .await
                .map_err(|e| AppError::Internal(format!("credential check aborted: {}", e)))
        );
        if !verified {
            at_stage!(ctx, Stage::Authenticating, Err::<(), _>(CredentialError::InvalidPassword));
        }

        let record = self.issue(&user.identity, &ctx).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.identity,
            stage = %Stage::Completed,
            "User authenticated"
        );
        Ok(record)
    }

    /// Authorize a presented access token, returning its owner
    ///
    /// Succeeds only if the signature verifies, the token has not expired,
    /// and its session entry still exists.
    pub async fn authorize(&self, access_token: &str) -> Result<Identity, AppError> {
        self.authorize_with(ErrorContext::new("authorize"), access_token).await
    }

    pub async fn authorize_with(&self, ctx: ErrorContext, access_token: &str) -> Result<Identity, AppError> {
        let claims = at_stage!(ctx, Stage::Decoding, self.minter.codec().decode_access(access_token));
        let details = claims.details();
        let ctx = ctx.with_user_id(details.user_id.to_string());

        let owner = at_stage!(ctx, Stage::LedgerLookup, self.ledger.get(&details.access_uuid).await);
        if owner != details.user_id {
            tracing::warn!(
                request_id = %ctx.request_id,
                access_uuid = %details.access_uuid,
                "Session owner does not match token subject"
            );
            at_stage!(ctx, Stage::LedgerLookup, Err::<(), _>(LedgerError::NotFound));
        }

        tracing::debug!(request_id = %ctx.request_id, user_id = %owner, "Access token authorized");
        Ok(owner)
    }

    /// Authorize the token carried in an `Authorization` header value
    pub async fn authorize_bearer(&self, header: &str) -> Result<Identity, AppError> {
        match extract_token(header) {
            Some(token) => self.authorize(token).await,
            None => {
                let ctx = ErrorContext::new("authorize");
                let err = AppError::Token(TokenError::Malformed);
                ctx.log_error(Stage::Received, &err);
                Err(err)
            }
        }
    }

    /// Revoke an access token. Returns how many session entries were removed;
    /// revoking an already revoked token removes 0 and is not an error.
    pub async fn revoke(&self, access_token: &str) -> Result<u64, AppError> {
        self.revoke_with(ErrorContext::new("revoke"), access_token, TokenKind::Access)
            .await
    }

    /// Revoke a refresh token (end the refresh session)
    pub async fn revoke_refresh(&self, refresh_token: &str) -> Result<u64, AppError> {
        self.revoke_with(ErrorContext::new("revoke_refresh"), refresh_token, TokenKind::Refresh)
            .await
    }

    pub async fn revoke_with(&self, ctx: ErrorContext, token: &str, kind: TokenKind) -> Result<u64, AppError> {
        let claims = at_stage!(ctx, Stage::Decoding, self.minter.codec().decode(token, kind));
        let ctx = ctx.with_user_id(claims.identity().to_string());

        let removed = at_stage!(ctx, Stage::Revoking, self.ledger.delete(&claims.token_id()).await);

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %claims.identity(),
            kind = %kind,
            removed,
            "Token revoked"
        );
        Ok(removed)
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The presented refresh token is single-use. The new pair is recorded
    /// before the old entry is consumed, so a store failure leaves the old
    /// refresh token usable. Replaying a consumed token fails with `NotFound`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, AppError> {
        self.refresh_with(ErrorContext::new("refresh"), refresh_token).await
    }

    pub async fn refresh_with(&self, ctx: ErrorContext, refresh_token: &str) -> Result<TokenRecord, AppError> {
        let claims = at_stage!(
            ctx,
            Stage::Decoding,
            self.minter.codec().decode(refresh_token, TokenKind::Refresh)
        );
        let token_id = claims.token_id();
        let ctx = ctx.with_user_id(claims.identity().to_string());

        let owner = at_stage!(ctx, Stage::LedgerLookup, self.ledger.get(&token_id).await);
        if &owner != claims.identity() {
            at_stage!(ctx, Stage::LedgerLookup, Err::<(), _>(LedgerError::NotFound));
        }

        let record = self.issue(&owner, &ctx).await?;

        // A concurrent refresh may have consumed the entry since the lookup
        let removed = match self.ledger.delete(&token_id).await {
            Ok(removed) => removed,
            Err(e) => {
                self.discard(&record, &ctx).await;
                at_stage!(ctx, Stage::Revoking, Err::<u64, _>(e))
            }
        };
        if removed == 0 {
            self.discard(&record, &ctx).await;
            at_stage!(ctx, Stage::Revoking, Err::<(), _>(LedgerError::NotFound));
        }

        tracing::info!(request_id = %ctx.request_id, user_id = %owner, "Token pair refreshed");
        Ok(record)
    }

    /// Minting → Persisting. The pair is only returned once both entries are recorded.
    async fn issue(&self, identity: &Identity, ctx: &ErrorContext) -> Result<TokenRecord, AppError> {
        let record = at_stage!(
            ctx,
            Stage::Minting,
            self.minter
                .mint(identity)
                .map_err(|e| AppError::Internal(e.to_string()))
        );

        at_stage!(
            ctx,
            Stage::Persisting,
            self.persist(&record, identity)
                .await
                .map_err(AppError::SessionNotRecorded)
        );

        Ok(record)
    }

    /// Record both token-ids, each living exactly as long as its token
    async fn persist(&self, record: &TokenRecord, identity: &Identity) -> Result<(), LedgerError> {
        let now_ms = Utc::now().timestamp_millis();
        let access_ttl = ttl_until(record.at_expires, now_ms);
        let refresh_ttl = ttl_until(record.rt_expires, now_ms);

        tokio::try_join!(
            self.put(&record.access_uuid, identity, access_ttl),
            self.put(&record.refresh_uuid, identity, refresh_ttl),
        )?;
        Ok(())
    }

    async fn put(&self, token_id: &Uuid, identity: &Identity, ttl: Duration) -> Result<(), LedgerError> {
        self.ledger.put(token_id, identity, ttl).await
    }

    /// Drop a pair that was recorded but will not be handed out
    async fn discard(&self, record: &TokenRecord, ctx: &ErrorContext) {
        for token_id in [&record.access_uuid, &record.refresh_uuid] {
            if let Err(e) = self.ledger.delete(token_id).await {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    token_id = %token_id,
                    error = %e,
                    "Failed to discard unissued session entry"
                );
            }
        }
    }
}

/// Remaining lifetime of a token expiring at `expires_at` (Unix seconds)
fn ttl_until(expires_at: i64, now_ms: i64) -> Duration {
    let remaining = expires_at.saturating_mul(1000).saturating_sub(now_ms);
    Duration::from_millis(remaining.max(0) as u64)
}
