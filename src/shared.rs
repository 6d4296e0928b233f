use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::AuthConfig;
use crate::session::{
    issuer::TokenIssuer,
    service::SessionService,
    signer::{JwtSigner, TokenSigner},
    verifier::TokenVerifier,
};
use crate::user::{models::Role, password::PasswordHasher, repository::UserRepository};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub session_service: Arc<SessionService>,
    pub token_verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Wires the signer, issuer, verifier and session service around one user store
    pub fn new(
        auth_config: &AuthConfig,
        user_repository: Arc<dyn UserRepository + Send + Sync>,
        password_hasher: PasswordHasher,
    ) -> Self {
        let signer: Arc<dyn TokenSigner> = Arc::new(JwtSigner::new(auth_config.secret()));
        let issuer = TokenIssuer::new(Arc::clone(&signer), auth_config);
        let token_verifier = Arc::new(TokenVerifier::new(signer, Arc::clone(&user_repository)));
        let session_service = Arc::new(SessionService::new(
            user_repository,
            issuer,
            Arc::clone(&token_verifier),
            password_hasher,
        ));

        Self {
            session_service,
            token_verifier,
        }
    }
}

/// Which lookup failed to find an identity; decides the status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupContext {
    /// Profile, password and account operations (404)
    Account,
    /// Refresh-token verification (401)
    Refresh,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No token provided")]
    NoToken,

    #[error("No refresh token provided")]
    NoRefreshToken,

    #[error("Invalid or expired token")]
    InvalidToken(String),

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken(String),

    #[error("Invalid token type")]
    InvalidTokenType(String),

    #[error("Invalid refresh token type")]
    InvalidRefreshTokenType(String),

    #[error("Refresh token not found or already used")]
    RefreshTokenNotFound { user_id: String },

    #[error("User not found")]
    UserNotFound {
        user_id: String,
        context: LookupContext,
    },

    #[error("User already exists with this email")]
    UserAlreadyExists { email: String },

    #[error("Invalid email or password")]
    InvalidCredentials { email: String },

    #[error("Account is deactivated")]
    AccountDeactivated { user_id: String },

    #[error("Admin access required")]
    InsufficientPermissions { role: Role },

    #[error("Current password is incorrect")]
    InvalidCurrentPassword { user_id: String },

    #[error("Failed to generate access token")]
    TokenGeneration(String),

    #[error("Failed to generate refresh token")]
    RefreshTokenGeneration(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database operation failed")]
    DatabaseError(String),

    #[error("Failed to process password")]
    PasswordHash(String),
}

impl AppError {
    /// Stable machine-readable error kind sent to clients
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NoToken => "NO_TOKEN",
            AppError::NoRefreshToken => "NO_REFRESH_TOKEN",
            AppError::InvalidToken(_) => "INVALID_TOKEN",
            AppError::InvalidRefreshToken(_) => "INVALID_REFRESH_TOKEN",
            AppError::InvalidTokenType(_) => "INVALID_TOKEN_TYPE",
            AppError::InvalidRefreshTokenType(_) => "INVALID_REFRESH_TOKEN_TYPE",
            AppError::RefreshTokenNotFound { .. } => "REFRESH_TOKEN_NOT_FOUND",
            AppError::UserNotFound { .. } => "USER_NOT_FOUND",
            AppError::UserAlreadyExists { .. } => "USER_ALREADY_EXISTS",
            AppError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            AppError::AccountDeactivated { .. } => "ACCOUNT_DEACTIVATED",
            AppError::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            AppError::InvalidCurrentPassword { .. } => "INVALID_CURRENT_PASSWORD",
            AppError::TokenGeneration(_) => "TOKEN_GENERATION_ERROR",
            AppError::RefreshTokenGeneration(_) => "REFRESH_TOKEN_GENERATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::PasswordHash(_) => "PASSWORD_HASH_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoToken
            | AppError::NoRefreshToken
            | AppError::InvalidToken(_)
            | AppError::InvalidRefreshToken(_)
            | AppError::InvalidTokenType(_)
            | AppError::InvalidRefreshTokenType(_)
            | AppError::RefreshTokenNotFound { .. }
            | AppError::InvalidCredentials { .. }
            | AppError::InvalidCurrentPassword { .. } => StatusCode::UNAUTHORIZED,
            AppError::UserNotFound { context, .. } => match context {
                LookupContext::Account => StatusCode::NOT_FOUND,
                LookupContext::Refresh => StatusCode::UNAUTHORIZED,
            },
            AppError::UserAlreadyExists { .. } => StatusCode::CONFLICT,
            AppError::AccountDeactivated { .. } | AppError::InsufficientPermissions { .. } => {
                StatusCode::FORBIDDEN
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TokenGeneration(_)
            | AppError::RefreshTokenGeneration(_)
            | AppError::DatabaseError(_)
            | AppError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Server-side detail for logs. Never part of a response body.
    pub fn diagnostic(&self) -> String {
        match self {
            AppError::NoToken | AppError::NoRefreshToken => String::new(),
            AppError::InvalidToken(detail)
            | AppError::InvalidRefreshToken(detail)
            | AppError::TokenGeneration(detail)
            | AppError::RefreshTokenGeneration(detail)
            | AppError::Validation(detail)
            | AppError::DatabaseError(detail)
            | AppError::PasswordHash(detail) => detail.clone(),
            AppError::InvalidTokenType(found) | AppError::InvalidRefreshTokenType(found) => {
                format!("token_type={}", found)
            }
            AppError::RefreshTokenNotFound { user_id }
            | AppError::AccountDeactivated { user_id }
            | AppError::InvalidCurrentPassword { user_id } => format!("user_id={}", user_id),
            AppError::UserNotFound { user_id, context } => {
                format!("user_id={} context={:?}", user_id, context)
            }
            AppError::UserAlreadyExists { email } | AppError::InvalidCredentials { email } => {
                format!("email={}", email)
            }
            AppError::InsufficientPermissions { role } => format!("role={}", role),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        if status.is_server_error() {
            error!(kind, diagnostic = %self.diagnostic(), "Request failed");
        } else {
            warn!(kind, diagnostic = %self.diagnostic(), "Request rejected");
        }

        let body = Json(json!({
            "error": kind,
            "message": self.to_string(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
