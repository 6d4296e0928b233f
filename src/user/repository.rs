use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{normalize_email, ProfileFields, ProfileUpdate, Role, UserModel};
use crate::shared::{AppError, LookupContext};

/// Credential store. Every mutation is a single atomic call scoped to the
/// columns it changes, never a write-back of a stale copy.
#[async_trait]
pub trait UserRepository {
    /// Fails with `UserAlreadyExists` if the email is taken
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError>;
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserModel>, AppError>;
    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError>;
    /// Applies the fields present in `update` to the stored row and returns it.
    /// Fails with `UserAlreadyExists` if the new email belongs to someone else.
    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserModel, AppError>;
    async fn set_password_hash(&self, user_id: &str, password_hash: &str)
        -> Result<(), AppError>;
    async fn set_active(&self, user_id: &str, is_active: bool) -> Result<(), AppError>;

    async fn add_refresh_token(&self, user_id: &str, token: &str) -> Result<(), AppError>;
    /// Returns false if the token was not in the set
    async fn remove_refresh_token(&self, user_id: &str, token: &str) -> Result<bool, AppError>;
    /// Swaps `old_token` for `new_token`; returns false and changes nothing
    /// if `old_token` is no longer in the set
    async fn replace_refresh_token(
        &self,
        user_id: &str,
        old_token: &str,
        new_token: &str,
    ) -> Result<bool, AppError>;
    /// Returns false if the user does not exist
    async fn clear_refresh_tokens(&self, user_id: &str) -> Result<bool, AppError>;
}

fn missing_user(user_id: &str) -> AppError {
    AppError::UserNotFound {
        user_id: user_id.to_string(),
        context: LookupContext::Account,
    }
}

/// In-memory implementation of UserRepository for development and testing
///
/// Each call holds the map lock for its whole read-modify-write, which is
/// what gives the token mutations their per-identity atomicity.
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, UserModel>>,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an in-memory repository with pre-populated users
    pub fn with_users(users: Vec<UserModel>) -> Self {
        let user_map = users.into_iter().map(|u| (u.id.clone(), u)).collect();

        Self {
            users: Mutex::new(user_map),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    /// Current refresh-token set for a user (empty if unknown)
    pub fn refresh_tokens(&self, user_id: &str) -> Vec<String> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|u| u.refresh_tokens.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError> {
        debug!(user_id = %user.id, email = %user.email, "Creating user in memory");

        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            warn!(email = %user.email, "Email already registered in memory");
            return Err(AppError::UserAlreadyExists {
                email: user.email.clone(),
            });
        }
        if users.contains_key(&user.id) {
            warn!(user_id = %user.id, "User id already exists in memory");
            return Err(AppError::DatabaseError("User already exists".to_string()));
        }
        users.insert(user.id.clone(), user.clone());

        debug!(user_id = %user.id, "User created successfully in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        let users = self.users.lock().unwrap();
        let user = users.get(user_id).cloned();

        match &user {
            Some(u) => debug!(user_id = %user_id, email = %u.email, "User found in memory"),
            None => debug!(user_id = %user_id, "User not found in memory"),
        }

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        let email = normalize_email(email);
        let users = self.users.lock().unwrap();

        Ok(users.values().find(|u| u.email == email).cloned())
    }

    #[instrument(skip(self, update))]
    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserModel, AppError> {
        let mut users = self.users.lock().unwrap();

        if let Some(email) = update.email.as_deref().map(normalize_email) {
            if users.values().any(|u| u.id != user_id && u.email == email) {
                return Err(AppError::UserAlreadyExists { email });
            }
        }

        let stored = users.get_mut(user_id).ok_or_else(|| {
            warn!(user_id = %user_id, "User not found for profile update in memory");
            missing_user(user_id)
        })?;
        stored.apply_profile_update(update.clone());

        debug!(user_id = %user_id, "Profile updated in memory");
        Ok(stored.clone())
    }

    #[instrument(skip(self, password_hash))]
    async fn set_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;

        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();

        debug!(user_id = %user_id, "Password hash replaced in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_active(&self, user_id: &str, is_active: bool) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;

        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn add_refresh_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;

        user.refresh_tokens.push(token.to_string());
        user.updated_at = Utc::now();

        debug!(
            user_id = %user_id,
            active_refresh_tokens = user.refresh_tokens.len(),
            "Refresh token added in memory"
        );
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn remove_refresh_token(&self, user_id: &str, token: &str) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };

        let before = user.refresh_tokens.len();
        user.refresh_tokens.retain(|t| t != token);
        let removed = user.refresh_tokens.len() != before;
        if removed {
            user.updated_at = Utc::now();
        }

        debug!(user_id = %user_id, removed, "Refresh token removal in memory");
        Ok(removed)
    }

    #[instrument(skip(self, old_token, new_token))]
    async fn replace_refresh_token(
        &self,
        user_id: &str,
        old_token: &str,
        new_token: &str,
    ) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };

        if !user.has_refresh_token(old_token) {
            debug!(user_id = %user_id, "Refresh token to replace is gone");
            return Ok(false);
        }

        user.refresh_tokens.retain(|t| t != old_token);
        user.refresh_tokens.push(new_token.to_string());
        user.updated_at = Utc::now();

        debug!(user_id = %user_id, "Refresh token rotated in memory");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn clear_refresh_tokens(&self, user_id: &str) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };

        let cleared = user.refresh_tokens.len();
        user.refresh_tokens.clear();
        user.updated_at = Utc::now();

        debug!(user_id = %user_id, cleared, "Refresh tokens cleared in memory");
        Ok(true)
    }
}

/// PostgreSQL implementation of the user repository
///
/// The token set lives in a `TEXT[]` column; each mutation is one
/// conditional `UPDATE`, so concurrent refreshes serialize on the row lock.
pub struct PostgresUserRepository {
    pool: PgPool,
}

const USER_COLUMNS: &str = "id, email, password_hash, role, is_active, refresh_tokens, \
     first_name, last_name, avatar, phone_number, date_of_birth, created_at, updated_at";

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `users` table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                refresh_tokens TEXT[] NOT NULL DEFAULT '{}',
                first_name TEXT,
                last_name TEXT,
                avatar TEXT,
                phone_number TEXT,
                date_of_birth DATE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create users table");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    fn user_from_row(row: &PgRow) -> Result<UserModel, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role.parse::<Role>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: e.into(),
        })?;

        Ok(UserModel {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role,
            is_active: row.try_get("is_active")?,
            refresh_tokens: row.try_get("refresh_tokens")?,
            profile: ProfileFields {
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                avatar: row.try_get("avatar")?,
                phone_number: row.try_get("phone_number")?,
                date_of_birth: row.try_get("date_of_birth")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<UserModel>, AppError> {
        let query = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, column, "Failed to fetch user from database");
                AppError::DatabaseError(e.to_string())
            })?;

        row.as_ref()
            .map(Self::user_from_row)
            .transpose()
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError> {
        debug!(user_id = %user.id, email = %user.email, "Creating user in database");

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, is_active, refresh_tokens, \
             first_name, last_name, avatar, phone_number, date_of_birth, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(&user.refresh_tokens)
        .bind(&user.profile.first_name)
        .bind(&user.profile.last_name)
        .bind(&user.profile.avatar)
        .bind(&user.profile.phone_number)
        .bind(user.profile.date_of_birth)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!(email = %user.email, "Email already registered in database");
                return AppError::UserAlreadyExists {
                    email: user.email.clone(),
                };
            }
            warn!(error = %e, "Failed to create user in database");
            AppError::DatabaseError(e.to_string())
        })?;

        debug!(user_id = %user.id, "User created successfully in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        self.fetch_one_by("id", user_id).await
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        self.fetch_one_by("email", &normalize_email(email)).await
    }

    #[instrument(skip(self, update))]
    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserModel, AppError> {
        debug!(user_id = %user_id, "Updating profile in database");

        let email = update.email.as_deref().map(normalize_email);
        let query = format!(
            "UPDATE users SET email = COALESCE($2, email), \
             first_name = COALESCE($3, first_name), last_name = COALESCE($4, last_name), \
             avatar = COALESCE($5, avatar), phone_number = COALESCE($6, phone_number), \
             date_of_birth = COALESCE($7, date_of_birth), updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(&email)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.avatar)
            .bind(&update.phone_number)
            .bind(update.date_of_birth)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return AppError::UserAlreadyExists {
                        email: email.clone().unwrap_or_default(),
                    };
                }
                warn!(error = %e, user_id = %user_id, "Failed to update profile in database");
                AppError::DatabaseError(e.to_string())
            })?
            .ok_or_else(|| {
                warn!(user_id = %user_id, "User not found for profile update");
                missing_user(user_id)
            })?;

        Self::user_from_row(&row).map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    #[instrument(skip(self, password_hash))]
    async fn set_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to replace password hash");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(missing_user(user_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_active(&self, user_id: &str, is_active: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %user_id, "Failed to change account status");
                AppError::DatabaseError(e.to_string())
            })?;

        if result.rows_affected() == 0 {
            return Err(missing_user(user_id));
        }
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn add_refresh_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_tokens = array_append(refresh_tokens, $2), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to add refresh token");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(missing_user(user_id));
        }
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn remove_refresh_token(&self, user_id: &str, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_tokens = array_remove(refresh_tokens, $2), \
             updated_at = NOW() WHERE id = $1 AND $2 = ANY(refresh_tokens)",
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to remove refresh token");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, old_token, new_token))]
    async fn replace_refresh_token(
        &self,
        user_id: &str,
        old_token: &str,
        new_token: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_tokens = array_append(array_remove(refresh_tokens, $2), $3), \
             updated_at = NOW() WHERE id = $1 AND $2 = ANY(refresh_tokens)",
        )
        .bind(user_id)
        .bind(old_token)
        .bind(new_token)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to rotate refresh token");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn clear_refresh_tokens(&self, user_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_tokens = '{}', updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to clear refresh tokens");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }
}
