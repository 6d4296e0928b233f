//! Test assertion helpers - fluent API for verifying test expectations
#![allow(dead_code)] // Test utilities may not all be used in every test

use axum::{http::StatusCode, response::Response};
use serde_json::Value;

// ============================================================================
// Assertion Helpers
// ============================================================================

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Self { status, body }
    }

    /// Assert the status code and return self for chaining
    pub fn expect_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status, expected,
            "unexpected status, body: {}",
            self.body
        );
        self
    }

    /// Assert an error body with the given kind and matching code
    pub fn expect_error(self, expected_status: StatusCode, kind: &str) -> Self {
        let response = self.expect_status(expected_status);
        assert_eq!(response.body["error"], kind, "body: {}", response.body);
        assert_eq!(response.body["code"], expected_status.as_u16());
        assert!(response.body["message"].is_string());
        response
    }

    pub fn expect_message(self, message: &str) -> Self {
        assert_eq!(self.body["message"], message);
        self
    }

    pub fn access_token(&self) -> String {
        self.string_field("accessToken")
    }

    pub fn refresh_token(&self) -> String {
        self.string_field("refreshToken")
    }

    pub fn user(&self) -> &Value {
        &self.body["user"]
    }

    fn string_field(&self, field: &str) -> String {
        self.body[field]
            .as_str()
            .unwrap_or_else(|| panic!("missing {} in {}", field, self.body))
            .to_string()
    }
}
