use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{
    signer::TokenSigner,
    types::{IdentityClaims, TokenClaims, TokenType},
};
use crate::{
    shared::{AppError, LookupContext},
    user::{repository::UserRepository, Role},
};

/// Validates presented tokens and maps each failure to its error kind
///
/// Access tokens are checked by signature and expiry alone. Refresh tokens
/// are additionally looked up in the owner's current token set on every call.
pub struct TokenVerifier {
    signer: Arc<dyn TokenSigner>,
    users: Arc<dyn UserRepository + Send + Sync>,
}

impl TokenVerifier {
    pub fn new(signer: Arc<dyn TokenSigner>, users: Arc<dyn UserRepository + Send + Sync>) -> Self {
        Self { signer, users }
    }

    /// Accepts a raw token or an `Authorization` header value
    #[instrument(skip_all)]
    pub fn verify_access_token(&self, token: &str) -> Result<IdentityClaims, AppError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(AppError::NoToken);
        }

        let claims = self
            .signer
            .verify(token)
            .map_err(|e| AppError::InvalidToken(e.to_string()))?;

        // Untyped tokens predate the type claim and are treated as access tokens
        if let Some(found) = claims.token_type.as_deref() {
            if found != TokenType::Access.as_str() {
                warn!(user_id = %claims.user_id, token_type = found, "Non-access token presented");
                return Err(AppError::InvalidTokenType(found.to_string()));
            }
        }

        debug!(user_id = %claims.user_id, role = %claims.role, "Access token verified");
        Ok(claims.identity())
    }

    #[instrument(skip(self, token))]
    pub async fn verify_refresh_token(
        &self,
        token: &str,
        revoke_on_success: bool,
    ) -> Result<TokenClaims, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::NoRefreshToken);
        }

        let claims = self
            .signer
            .verify(token)
            .map_err(|e| AppError::InvalidRefreshToken(e.to_string()))?;

        if !claims.is_type(TokenType::Refresh) {
            let found = claims.token_type.clone().unwrap_or_else(|| "none".to_string());
            warn!(user_id = %claims.user_id, token_type = %found, "Non-refresh token presented");
            return Err(AppError::InvalidRefreshTokenType(found));
        }

        let user = self
            .users
            .find_by_id(&claims.user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                user_id: claims.user_id.clone(),
                context: LookupContext::Refresh,
            })?;

        let not_found = || AppError::RefreshTokenNotFound {
            user_id: claims.user_id.clone(),
        };

        if !user.has_refresh_token(token) {
            warn!(user_id = %claims.user_id, "Refresh token is not in the active set");
            return Err(not_found());
        }

        // A concurrent call may have consumed the token since the read above
        if revoke_on_success && !self.users.remove_refresh_token(&user.id, token).await? {
            warn!(user_id = %claims.user_id, "Refresh token was consumed concurrently");
            return Err(not_found());
        }

        debug!(user_id = %claims.user_id, revoked = revoke_on_success, "Refresh token verified");
        Ok(claims)
    }

    pub fn require_admin(&self, token: &str) -> Result<IdentityClaims, AppError> {
        let identity = self.verify_access_token(token)?;

        if identity.role != Role::Admin {
            warn!(user_id = %identity.user_id, role = %identity.role, "Admin access denied");
            return Err(AppError::InsufficientPermissions {
                role: identity.role,
            });
        }

        Ok(identity)
    }
}

fn strip_bearer(token: &str) -> &str {
    let token = token.trim();
    match token.get(..6) {
        Some(scheme)
            if scheme.eq_ignore_ascii_case("bearer")
                && token[6..].chars().next().map_or(true, char::is_whitespace) =>
        {
            token[6..].trim()
        }
        _ => token,
    }
}
