#![allow(dead_code)] // Test utilities may not all be used in every test

use axum::Router;
use chrono::Duration;
use std::sync::Arc;

use readmission_backend::{
    build_router, AppState, AuthConfig, InMemoryUserRepository, PasswordHasher, Role, UserModel,
};

pub const TEST_PASSWORD: &str = "pw123456";

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub app: Router,
    pub state: AppState,
    pub users: Arc<InMemoryUserRepository>,
}

pub struct TestSetupBuilder {
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
    seeded: Vec<(String, Role, bool)>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            access_token_lifetime: Duration::hours(1),
            refresh_token_lifetime: Duration::days(7),
            seeded: vec![],
        }
    }

    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    pub fn with_refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }

    /// Seeds an account with `TEST_PASSWORD`
    pub fn with_user(mut self, email: &str, role: Role) -> Self {
        self.seeded.push((email.to_string(), role, true));
        self
    }

    pub fn with_admin(self, email: &str) -> Self {
        self.with_user(email, Role::Admin)
    }

    pub fn with_deactivated_user(mut self, email: &str) -> Self {
        self.seeded.push((email.to_string(), Role::User, false));
        self
    }

    pub fn build(self) -> TestSetup {
        let hasher = PasswordHasher::with_cost(8, 1).unwrap();

        let seeded = self
            .seeded
            .into_iter()
            .map(|(email, role, is_active)| {
                let hash = hasher.hash(TEST_PASSWORD).unwrap();
                let mut user = UserModel::new(&email, hash, role, Default::default());
                user.is_active = is_active;
                user
            })
            .collect();
        let users = Arc::new(InMemoryUserRepository::with_users(seeded));

        let auth_config = AuthConfig::new(
            "integration-test-secret",
            self.access_token_lifetime,
            self.refresh_token_lifetime,
        );
        let state = AppState::new(&auth_config, users.clone(), hasher);

        TestSetup {
            app: build_router(state.clone()),
            state,
            users,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
