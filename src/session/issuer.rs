use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::{
    signer::{SignerError, TokenSigner},
    types::{IdentityClaims, TokenClaims, TokenPair, TokenType},
};
use crate::{config::AuthConfig, shared::AppError};

/// Mints signed access and refresh tokens
pub struct TokenIssuer {
    signer: Arc<dyn TokenSigner>,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(signer: Arc<dyn TokenSigner>, config: &AuthConfig) -> Self {
        Self {
            signer,
            access_token_lifetime: config.access_token_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
        }
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub fn issue_access_token(&self, identity: &IdentityClaims) -> Result<String, AppError> {
        self.issue(identity, TokenType::Access, self.access_token_lifetime)
            .map_err(|e| {
                error!(error = %e, "Access token generation failed");
                AppError::TokenGeneration(e.to_string())
            })
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub fn issue_refresh_token(&self, identity: &IdentityClaims) -> Result<String, AppError> {
        self.issue(identity, TokenType::Refresh, self.refresh_token_lifetime)
            .map_err(|e| {
                error!(error = %e, "Refresh token generation failed");
                AppError::RefreshTokenGeneration(e.to_string())
            })
    }

    /// Both tokens carry the same identity but are signed and expire independently
    pub fn issue_token_pair(&self, identity: &IdentityClaims) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(identity)?,
            refresh_token: self.issue_refresh_token(identity)?,
        })
    }

    fn issue(
        &self,
        identity: &IdentityClaims,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Result<String, SignerError> {
        if identity.user_id.is_empty() || identity.email.is_empty() {
            return Err(SignerError::Sign(
                "userId and email claims are required".to_string(),
            ));
        }

        let now = Utc::now();
        let claims = TokenClaims {
            user_id: identity.user_id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            token_type: Some(token_type.as_str().to_string()),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        debug!(
            token_type = token_type.as_str(),
            exp_timestamp = claims.exp,
            "Signing token"
        );

        self.signer.sign(&claims)
    }
}
