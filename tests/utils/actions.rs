#![allow(dead_code)] // Test utilities may not all be used in every test

use axum::{
    body::Body,
    http::{header, Method, Request},
};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use super::{assertions::TestResponse, setup::TestSetup, setup::TEST_PASSWORD};

// ============================================================================
// Action Helpers
// ============================================================================

impl TestSetup {
    /// Send a request through the full router and collect the JSON body
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        TestResponse::from_response(response).await
    }

    // ============================================================================
    // Convenience Action Methods
    // ============================================================================

    pub async fn register(&self, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Login with the seeded password
    pub async fn login_seeded(&self, email: &str) -> TestResponse {
        self.login(email, TEST_PASSWORD).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await
    }

    pub async fn logout(&self, refresh_token: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/logout",
            None,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await
    }

    pub async fn logout_all(&self, access_token: &str) -> TestResponse {
        self.send(Method::POST, "/auth/logout-all", Some(access_token), None)
            .await
    }

    pub async fn get_profile(&self, access_token: &str) -> TestResponse {
        self.send(Method::GET, "/auth/profile", Some(access_token), None)
            .await
    }

    pub async fn update_profile(&self, access_token: &str, update: Value) -> TestResponse {
        self.send(Method::PUT, "/auth/profile", Some(access_token), Some(update))
            .await
    }

    pub async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/change-password",
            Some(access_token),
            Some(json!({
                "currentPassword": current_password,
                "newPassword": new_password,
            })),
        )
        .await
    }

    pub async fn admin_ping(&self, access_token: &str) -> TestResponse {
        self.send(Method::GET, "/auth/admin/ping", Some(access_token), None)
            .await
    }

    /// Stored refresh tokens of the account registered under `email`
    pub async fn stored_refresh_tokens(&self, email: &str) -> Vec<String> {
        use readmission_backend::UserRepository;

        let user = self.users.find_by_email(email).await.unwrap().unwrap();
        self.users.refresh_tokens(&user.id)
    }
}
