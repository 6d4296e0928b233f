use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    issuer::TokenIssuer,
    types::{AuthResponse, IdentityClaims, TokenPair},
    verifier::TokenVerifier,
};
use crate::{
    shared::{AppError, LookupContext},
    user::{
        models::{normalize_email, ProfileFields, ProfileUpdate, PublicProfile, Role, UserModel},
        password::{validate_password, PasswordHasher},
        repository::UserRepository,
    },
};

/// Identity supplied at registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub profile: ProfileFields,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: Role::User,
            profile: ProfileFields::default(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_profile(mut self, profile: ProfileFields) -> Self {
        self.profile = profile;
        self
    }
}

/// Session orchestration: register, login, refresh, logout
///
/// Owns no cryptography or storage itself; it sequences the issuer, the
/// verifier and the user store.
pub struct SessionService {
    users: Arc<dyn UserRepository + Send + Sync>,
    issuer: TokenIssuer,
    verifier: Arc<TokenVerifier>,
    hasher: PasswordHasher,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserRepository + Send + Sync>,
        issuer: TokenIssuer,
        verifier: Arc<TokenVerifier>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            issuer,
            verifier,
            hasher,
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    #[instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn register(&self, new_user: NewUser) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&new_user.email);
        validate_email(&email)?;
        validate_password(&new_user.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "Registration rejected, email already registered");
            return Err(AppError::UserAlreadyExists { email });
        }

        let password_hash = self.hasher.hash_blocking(&new_user.password).await?;
        let user = UserModel::new(&email, password_hash, new_user.role, new_user.profile);
        self.users.create_user(&user).await?;

        info!(user_id = %user.id, role = %user.role, "User registered");
        self.start_session(user).await
    }

    /// Checks the password before the active flag, so only a correct
    /// password can learn that an account is deactivated
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        // Unknown email and wrong password must be indistinguishable
        let invalid_credentials = || AppError::InvalidCredentials {
            email: email.clone(),
        };

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !self.hasher.verify_blocking(password, &user.password_hash).await {
            warn!(user_id = %user.id, "Login rejected, password mismatch");
            return Err(invalid_credentials());
        }

        if !user.is_active {
            warn!(user_id = %user.id, "Login rejected, account deactivated");
            return Err(AppError::AccountDeactivated { user_id: user.id });
        }

        info!(user_id = %user.id, "User logged in");
        self.start_session(user).await
    }

    /// Exchanges a refresh token for a new pair, consuming the old one
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self
            .verifier
            .verify_refresh_token(refresh_token, false)
            .await?;

        let pair = self.issuer.issue_token_pair(&claims.identity())?;

        // Single conditional swap: either the old token is replaced by the new
        // one, or a concurrent refresh/logout got there first and nothing changes
        let rotated = self
            .users
            .replace_refresh_token(&claims.user_id, refresh_token.trim(), &pair.refresh_token)
            .await?;
        if !rotated {
            warn!(user_id = %claims.user_id, "Refresh token consumed before rotation");
            return Err(AppError::RefreshTokenNotFound {
                user_id: claims.user_id,
            });
        }

        info!(user_id = %claims.user_id, "Refresh token rotated");
        Ok(pair)
    }

    /// Revokes a refresh token. Never fails from the caller's point of view.
    #[instrument(skip(self, refresh_token))]
    pub async fn logout(&self, refresh_token: &str) {
        let outcome = self.verifier.verify_refresh_token(refresh_token, true).await;

        match outcome {
            Ok(claims) => info!(user_id = %claims.user_id, "Session logged out"),
            Err(error) => debug!(
                kind = error.kind(),
                diagnostic = %error.diagnostic(),
                "Logout ignored"
            ),
        }
    }

    /// Invalidates every refresh token of the user
    #[instrument(skip(self))]
    pub async fn logout_all(&self, user_id: &str) -> Result<(), AppError> {
        let found = self.users.clear_refresh_tokens(user_id).await?;
        info!(user_id = %user_id, found, "Logged out from all devices");
        Ok(())
    }

    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AppError::Validation(
                "Current password and new password are required".to_string(),
            ));
        }
        validate_password(new_password)?;

        let user = self.find_account(user_id).await?;

        if !self
            .hasher
            .verify_blocking(current_password, &user.password_hash)
            .await
        {
            warn!(user_id = %user_id, "Password change rejected, current password mismatch");
            return Err(AppError::InvalidCurrentPassword {
                user_id: user_id.to_string(),
            });
        }

        let password_hash = self.hasher.hash_blocking(new_password).await?;
        self.users.set_password_hash(user_id, &password_hash).await?;
        info!(user_id = %user_id, "Password changed");

        self.logout_all(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: &str) -> Result<PublicProfile, AppError> {
        Ok(self.find_account(user_id).await?.to_public_profile())
    }

    /// Edits profile fields only; password, role and sessions are untouched
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<PublicProfile, AppError> {
        if let Some(email) = &update.email {
            validate_email(&normalize_email(email))?;
        }

        // The store applies only the supplied fields to the current row
        let user = self.users.update_profile(user_id, &update).await?;

        info!(user_id = %user_id, "Profile updated");
        Ok(user.to_public_profile())
    }

    async fn find_account(&self, user_id: &str) -> Result<UserModel, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                user_id: user_id.to_string(),
                context: LookupContext::Account,
            })
    }

    /// Issues a pair for the user and records the refresh token
    async fn start_session(&self, user: UserModel) -> Result<AuthResponse, AppError> {
        let identity = IdentityClaims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        };
        let pair = self.issuer.issue_token_pair(&identity)?;
        self.users
            .add_refresh_token(&user.id, &pair.refresh_token)
            .await?;

        Ok(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: user.to_public_profile(),
        })
    }
}

/// Minimal shape check: `local@domain.tld`, no whitespace
fn validate_email(email: &str) -> Result<(), AppError> {
    let invalid = || AppError::Validation("Please enter a valid email".to_string());

    if email.len() > 255 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty());

    if local.is_empty() || !domain_ok {
        return Err(invalid());
    }
    Ok(())
}
