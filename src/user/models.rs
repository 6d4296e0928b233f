use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Authorization role stored on the identity and embedded in every token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Optional personal details kept alongside the credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

/// Partial profile edit; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Persisted user identity
#[derive(Debug, Clone)]
pub struct UserModel {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    /// Refresh tokens that may still be exchanged, in issuance order
    pub refresh_tokens: Vec<String>,
    pub profile: ProfileFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserModel {
    /// Creates an active identity with a fresh id and an empty token set
    pub fn new(email: &str, password_hash: String, role: Role, profile: ProfileFields) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(email),
            password_hash,
            role,
            is_active: true,
            refresh_tokens: Vec::new(),
            profile,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_refresh_token(&self, token: &str) -> bool {
        self.refresh_tokens.iter().any(|t| t == token)
    }

    pub fn apply_profile_update(&mut self, update: ProfileUpdate) {
        if let Some(email) = update.email {
            self.email = normalize_email(&email);
        }
        if let Some(first_name) = update.first_name {
            self.profile.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            self.profile.last_name = Some(last_name);
        }
        if let Some(avatar) = update.avatar {
            self.profile.avatar = Some(avatar);
        }
        if let Some(phone_number) = update.phone_number {
            self.profile.phone_number = Some(phone_number);
        }
        if let Some(date_of_birth) = update.date_of_birth {
            self.profile.date_of_birth = Some(date_of_birth);
        }
        self.updated_at = Utc::now();
    }

    /// Redacted view safe to return to clients
    pub fn to_public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            is_active: self.is_active,
            profile: self.profile.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// User as seen by clients: no password hash, no refresh tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(flatten)]
    pub profile: ProfileFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Emails are unique case-insensitively, so they are stored folded
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
