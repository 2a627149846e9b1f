/// Request Dispatcher
///
/// Receives auth requests as JSON over a Redis pub/sub channel, routes the
/// recognised request types to the coordinator, and publishes a reply for
/// each one on the reply channel.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::auth::{extract_token, PlainCredential, TokenKind};
use crate::configuration::RedisSettings;
use crate::coordinator::AuthCoordinator;
use crate::error::{AppError, ErrorContext, ErrorHandler, ErrorResponse, LedgerError, ValidationError};

/// An incoming request
///
/// `request_key` is chosen by the sender to match the reply to its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub request_key: String,
}

/// Request types this service answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    AuthenticateUser,
    AuthorizeUser,
    RegisterUser,
    DeleteUserAccessToken,
    RefreshUserAccessToken,
}

impl FromStr for RequestType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authenticateUser" => Ok(RequestType::AuthenticateUser),
            "authorizeUser" => Ok(RequestType::AuthorizeUser),
            "registerUser" => Ok(RequestType::RegisterUser),
            "deleteUserAccessToken" => Ok(RequestType::DeleteUserAccessToken),
            "refreshUserAccessToken" => Ok(RequestType::RefreshUserAccessToken),
            _ => Err(()),
        }
    }
}

/// Reply published for every handled request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub request_key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl Response {
    fn ok(request_key: &str, data: serde_json::Value) -> Self {
        Self {
            request_key: request_key.to_string(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(request_key: &str, error: ErrorResponse) -> Self {
        Self {
            request_key: request_key.to_string(),
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    coordinator: Arc<AuthCoordinator>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<AuthCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Handle one request. Unrecognised request types are ignored (`None`).
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let request_type = match request.request_type.parse::<RequestType>() {
            Ok(request_type) => request_type,
            Err(()) => {
                tracing::debug!(request_type = %request.request_type, "Ignoring unknown request type");
                return None;
            }
        };

        let key = request.request_key.as_str();
        let ctx = |operation: &str| ErrorContext::new(operation).with_request_id(key);

        let result: Result<serde_json::Value, AppError> = match request_type {
            RequestType::AuthenticateUser => {
                let email = field(&request.data, "email");
                let password = field(&request.data, "password");
                if email.is_empty() || password.is_empty() {
                    tracing::warn!(request_key = %key, "Authentication request missing credentials");
                    Err(AppError::Validation(ValidationError::EmptyField(
                        if email.is_empty() { "email" } else { "password" },
                    )))
                } else {
                    self.coordinator
                        .authenticate_with(ctx("authenticate"), email, PlainCredential::new(password))
                        .await
                        .and_then(to_json)
                }
            }
            RequestType::AuthorizeUser => self
                .coordinator
                .authorize_with(ctx("authorize"), presented_token(&request.data))
                .await
                .map(|identity| serde_json::json!({ "user_id": identity })),
            RequestType::DeleteUserAccessToken => self
                .coordinator
                .revoke_with(ctx("revoke"), presented_token(&request.data), TokenKind::Access)
                .await
                .map(|removed| serde_json::json!({ "deleted": removed })),
            RequestType::RefreshUserAccessToken => self
                .coordinator
                .refresh_with(ctx("refresh"), field(&request.data, "refresh_token"))
                .await
                .and_then(to_json),
            RequestType::RegisterUser => {
                return Some(Response::failed(
                    key,
                    ErrorResponse::new(
                        key.to_string(),
                        "request type not supported by this service".to_string(),
                        "UNSUPPORTED".to_string(),
                        false,
                    ),
                ));
            }
        };

        Some(match result {
            Ok(data) => Response::ok(key, data),
            Err(err) => Response::failed(key, err.error_response(key)),
        })
    }

    /// Listen for requests until the subscription ends.
    ///
    /// Each request is handled on its own task. Undecodable payloads are
    /// logged and skipped.
    pub async fn listen(&self, settings: &RedisSettings) -> Result<(), LedgerError> {
        let client = redis::Client::open(settings.connection_url())?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&settings.request_channel).await?;

        tracing::info!(channel = %settings.request_channel, "Auth service started, listening for requests");

        let mut messages = pubsub.on_message();
        while let Some(message) = messages.next().await {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping non-text message");
                    continue;
                }
            };

            let request: Request = match serde_json::from_str(&payload) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed request");
                    continue;
                }
            };

            tracing::info!(
                channel = message.get_channel_name(),
                request_type = %request.request_type,
                request_key = %request.request_key,
                "Received request"
            );

            let dispatcher = self.clone();
            let mut publisher = publisher.clone();
            let reply_channel = settings.reply_channel.clone();
            tokio::spawn(async move {
                let Some(response) = dispatcher.handle(request).await else {
                    return;
                };
                let body = match serde_json::to_string(&response) {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize reply");
                        return;
                    }
                };
                let published: Result<i64, _> = publisher.publish(&reply_channel, body).await;
                if let Err(e) = published {
                    tracing::error!(
                        request_key = %response.request_key,
                        error = %e,
                        "Failed to publish reply"
                    );
                }
            });
        }

        Err(LedgerError::StoreUnavailable(
            "request subscription closed".to_string(),
        ))
    }
}

fn field<'a>(data: &'a HashMap<String, String>, name: &str) -> &'a str {
    data.get(name).map(String::as_str).unwrap_or("")
}

/// The token from `data["token"]`, or from an `Authorization` header value in
/// `data["authorization"]`. Missing tokens decode as malformed.
fn presented_token(data: &HashMap<String, String>) -> &str {
    if let Some(token) = data.get("token").filter(|t| !t.is_empty()) {
        return token;
    }
    data.get("authorization")
        .and_then(|header| extract_token(header))
        .unwrap_or("")
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}
