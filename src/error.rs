/// Error Handling Module
///
/// Unified error handling for the token lifecycle.
/// It covers:
/// 1. Domain-specific error types (credentials, tokens, ledger, user store)
/// 2. The unified `AppError` used for control flow
/// 3. Caller-facing error responses (generic denials, retryable infra errors)
/// 4. Error context for structured logging

use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} bytes)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication failures.
///
/// Distinguished internally for logging; callers only ever see a generic
/// denial so that accounts cannot be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    InvalidUser,
    InvalidPassword,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::InvalidUser => write!(f, "Invalid User"),
            CredentialError::InvalidPassword => write!(f, "Invalid Password"),
        }
    }
}

impl StdError for CredentialError {}

/// Token encode/decode failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The string could not be parsed into the expected claim shape
    Malformed,
    /// Wrong algorithm family or the signature does not verify
    InvalidSignature,
    /// The embedded expiration has elapsed
    Expired,
    /// Claims could not be serialized while signing
    Encode(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::Encode(msg) => write!(f, "Token encoding failed: {}", msg),
        }
    }
}

impl StdError for TokenError {}

/// Session ledger failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No live entry for the token-id (revoked or expired server-side)
    NotFound,
    /// Connection or command failure talking to the store
    StoreUnavailable(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NotFound => write!(f, "Session not found"),
            LedgerError::StoreUnavailable(msg) => write!(f, "Session store unavailable: {}", msg),
        }
    }
}

impl StdError for LedgerError {}

/// User record store errors
#[derive(Debug)]
pub enum DatabaseError {
    ConnectionPool(String),
    QueryExecution(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type returned by every coordinator operation
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Credential(CredentialError),
    Token(TokenError),
    Ledger(LedgerError),
    Database(DatabaseError),
    Config(ConfigError),
    /// A minted pair could not be recorded ("Error performing Auth");
    /// retryable when the store was unreachable
    SessionNotRecorded(LedgerError),
    /// Unexpected mint failure ("Error performing Auth")
    Internal(String),
}

impl AppError {
    /// Infrastructure failures the caller may retry after backing off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Ledger(LedgerError::StoreUnavailable(_))
                | AppError::SessionNotRecorded(LedgerError::StoreUnavailable(_))
                | AppError::Database(DatabaseError::ConnectionPool(_))
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Credential(e) => write!(f, "{}", e),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Ledger(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::SessionNotRecorded(e) => {
                write!(f, "Error performing Auth: failed to record session: {}", e)
            }
            AppError::Internal(msg) => write!(f, "Error performing Auth: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        AppError::Credential(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::QueryExecution(err.to_string())),
        }
    }
}

impl From<redis::RedisError> for LedgerError {
    fn from(err: redis::RedisError) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}

// ============================================================================
// 3. CALLER-FACING RESPONSES
// ============================================================================

/// Error payload returned to the dispatcher's caller
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    /// Unique error ID for tracking (request ID)
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// Whether the caller may back off and retry
    pub retryable: bool,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, retryable: bool) -> Self {
        Self {
            error_id,
            message,
            code,
            retryable,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Converting errors to caller responses
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> ErrorResponse;
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> ErrorResponse {
        let (code, message) = match self {
            // Never tell the caller which half of the credentials was wrong
            AppError::Credential(_) | AppError::Validation(_) => {
                ("AUTHENTICATION_FAILED", "authentication failed")
            }
            AppError::Token(TokenError::Encode(_)) => ("INTERNAL_ERROR", "internal error"),
            AppError::Token(_) | AppError::Ledger(LedgerError::NotFound) => {
                ("UNAUTHORIZED", "unauthorized")
            }
            AppError::Ledger(LedgerError::StoreUnavailable(_))
            | AppError::SessionNotRecorded(LedgerError::StoreUnavailable(_))
            | AppError::Database(DatabaseError::ConnectionPool(_)) => (
                "SERVICE_UNAVAILABLE",
                "service temporarily unavailable, retry later",
            ),
            AppError::SessionNotRecorded(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_) => ("INTERNAL_ERROR", "internal error"),
        };

        ErrorResponse::new(
            request_id.to_string(),
            message.to_string(),
            code.to_string(),
            self.is_retryable(),
        )
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-request context for log correlation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Correlate with a caller-chosen id, such as a request's `request_key`
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        if !request_id.is_empty() {
            self.request_id = request_id;
        }
        self
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Logs a failed request together with the stage it failed in.
    /// The internal reason is logged even when the caller only sees a generic denial.
    pub fn log_error(&self, stage: impl fmt::Display, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Credential(reason) => {
                tracing::warn!(stage = %stage, reason = %reason, context = ?context, "Authentication denied");
            }
            AppError::Validation(_) | AppError::Token(TokenError::Malformed)
            | AppError::Token(TokenError::InvalidSignature) | AppError::Token(TokenError::Expired) => {
                tracing::warn!(stage = %stage, error = %error, context = ?context, "Request rejected");
            }
            AppError::Ledger(LedgerError::NotFound) => {
                tracing::warn!(stage = %stage, context = ?context, "Token revoked or expired server-side");
            }
            AppError::Ledger(_) | AppError::SessionNotRecorded(_) | AppError::Database(_) => {
                tracing::error!(stage = %stage, error = %error, context = ?context, "Store error");
            }
            AppError::Token(TokenError::Encode(_)) | AppError::Config(_) | AppError::Internal(_) => {
                tracing::error!(stage = %stage, error = %error, context = ?context, "Internal error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email");
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = TokenError::Expired.into();
        match app_err {
            AppError::Token(TokenError::Expired) => (),
            _ => panic!("Expected Token error"),
        }
    }

    #[test]
    fn test_credential_errors_are_indistinguishable_to_caller() {
        let user = AppError::Credential(CredentialError::InvalidUser).error_response("r1");
        let password = AppError::Credential(CredentialError::InvalidPassword).error_response("r2");

        assert_eq!(user.code, password.code);
        assert_eq!(user.message, password.message);
        assert_eq!(user.message, "authentication failed");
        assert!(!user.retryable);
    }

    #[test]
    fn test_token_failures_are_unauthorized() {
        for err in [
            AppError::Token(TokenError::Malformed),
            AppError::Token(TokenError::InvalidSignature),
            AppError::Token(TokenError::Expired),
            AppError::Ledger(LedgerError::NotFound),
        ] {
            let response = err.error_response("req");
            assert_eq!(response.message, "unauthorized");
            assert_eq!(response.code, "UNAUTHORIZED");
        }
    }

    #[test]
    fn test_store_unavailable_is_retryable() {
        let err = AppError::Ledger(LedgerError::StoreUnavailable("connection refused".into()));
        assert!(err.is_retryable());

        let response = err.error_response("req-1");
        assert_eq!(response.code, "SERVICE_UNAVAILABLE");
        assert!(response.retryable);
        assert_eq!(response.error_id, "req-1");
    }

    #[test]
    fn test_internal_error_is_not_retryable() {
        let err = AppError::Internal("mint failed".into());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Error performing Auth: mint failed");
    }

    #[test]
    fn test_unrecorded_session_follows_store_retryability() {
        let err = AppError::SessionNotRecorded(LedgerError::StoreUnavailable("timed out".into()));
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("Error performing Auth"));

        let response = err.error_response("req-2");
        assert_eq!(response.code, "SERVICE_UNAVAILABLE");
        assert!(response.retryable);

        let err = AppError::SessionNotRecorded(LedgerError::NotFound);
        assert!(!err.is_retryable());
        assert_eq!(err.error_response("req-3").code, "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_context_request_id() {
        let ctx = ErrorContext::new("authorize").with_request_id("k-42");
        assert_eq!(ctx.request_id, "k-42");

        // An empty key keeps the generated id
        let ctx = ErrorContext::new("authorize").with_request_id("");
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("authenticate");
        assert_eq!(ctx.operation, "authenticate");
        assert!(ctx.user_id.is_none());

        let ctx = ctx.with_user_id("user-123".to_string());
        assert_eq!(ctx.user_id, Some("user-123".to_string()));
    }
}
