use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::{debug, info, instrument};

use super::{
    middleware::{jwt_auth, require_admin},
    service::NewUser,
    types::{
        AuthResponse, ChangePasswordRequest, IdentityClaims, LoginRequest, MessageResponse,
        RefreshTokenRequest, RegisterRequest, TokenPair,
    },
};
use crate::shared::{AppError, AppState};
use crate::user::{ProfileUpdate, PublicProfile, Role};

/// Routes mounted under `/auth`
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/logout-all", post(logout_all))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/change-password", post(change_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth));

    let admin = Router::new()
        .route("/admin/ping", get(admin_ping))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .merge(authenticated)
        .merge(admin)
}

/// POST /auth/register
///
/// Public registration always creates a `user` role account.
#[instrument(name = "register", skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(request) = body?;
    let new_user = NewUser::new(request.email, request.password)
        .with_role(Role::User)
        .with_profile(request.profile);
    let response = state.session_service.register(new_user).await?;

    info!(user_id = %response.user.id, "Registration completed");
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login
#[instrument(name = "login", skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(request) = body?;
    let response = state
        .session_service
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(response))
}

/// POST /auth/refresh
#[instrument(name = "refresh", skip(state, body))]
pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AppError> {
    let Json(request) = body?;
    let pair = state
        .session_service
        .refresh(&request.refresh_token)
        .await?;
    Ok(Json(pair))
}

/// POST /auth/logout
///
/// Always succeeds, whether or not the token or even the body was valid.
#[instrument(name = "logout", skip(state, body))]
pub async fn logout(
    State(state): State<AppState>,
    body: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Json<MessageResponse> {
    let refresh_token = match body {
        Ok(Json(request)) => request.refresh_token,
        Err(rejection) => {
            debug!(rejection = %rejection.body_text(), "Logout body ignored");
            String::new()
        }
    };

    state.session_service.logout(&refresh_token).await;
    Json(MessageResponse::new("Logged out successfully"))
}

/// POST /auth/logout-all
#[instrument(name = "logout_all", skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<IdentityClaims>,
) -> Result<Json<MessageResponse>, AppError> {
    state.session_service.logout_all(&claims.user_id).await?;
    Ok(Json(MessageResponse::new("Logged out from all devices")))
}

/// GET /auth/profile
#[instrument(name = "get_profile", skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<IdentityClaims>,
) -> Result<Json<PublicProfile>, AppError> {
    let profile = state.session_service.get_profile(&claims.user_id).await?;
    Ok(Json(profile))
}

/// PUT /auth/profile
#[instrument(name = "update_profile", skip(state, claims, body), fields(user_id = %claims.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<IdentityClaims>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<PublicProfile>, AppError> {
    let Json(update) = body?;
    let profile = state
        .session_service
        .update_profile(&claims.user_id, update)
        .await?;
    Ok(Json(profile))
}

/// POST /auth/change-password
///
/// Signs the user out of every device on success.
#[instrument(name = "change_password", skip(state, claims, body), fields(user_id = %claims.user_id))]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<IdentityClaims>,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = body?;
    state
        .session_service
        .change_password(
            &claims.user_id,
            &request.current_password,
            &request.new_password,
        )
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// GET /auth/admin/ping
pub async fn admin_ping(Extension(claims): Extension<IdentityClaims>) -> Json<MessageResponse> {
    info!(user_id = %claims.user_id, "Admin ping");
    Json(MessageResponse::new("Admin access granted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use crate::user::repository::InMemoryUserRepository;
    use crate::user::{PasswordHasher, UserModel, UserRepository};
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn app(state: AppState) -> Router {
        Router::new()
            .nest("/auth", auth_routes(&state))
            .with_state(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_raw(uri: &str, content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn register_user(app: &Router, email: &str) -> Value {
        let (status, body) = send(
            app,
            post_json(
                "/auth/register",
                json!({ "email": email, "password": "pw123456", "firstName": "Ada" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn test_register_handler() {
        let app = app(AppStateBuilder::new().build());
        let body = register_user(&app, "a@test.com").await;

        assert!(body["accessToken"].is_string());
        assert!(body["refreshToken"].is_string());
        assert_eq!(body["user"]["email"], "a@test.com");
        assert_eq!(body["user"]["firstName"], "Ada");
        assert_eq!(body["user"]["role"], "user");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("refreshTokens").is_none());
    }

    #[tokio::test]
    async fn test_register_cannot_choose_role() {
        let app = app(AppStateBuilder::new().build());
        let (_, body) = send(
            &app,
            post_json(
                "/auth/register",
                json!({ "email": "a@test.com", "password": "pw123456", "role": "admin" }),
            ),
        )
        .await;
        assert_eq!(body["user"]["role"], "user");
    }

    #[tokio::test]
    async fn test_register_conflict_and_validation_bodies() {
        let app = app(AppStateBuilder::new().build());
        register_user(&app, "a@test.com").await;

        let (status, body) = send(
            &app,
            post_json(
                "/auth/register",
                json!({ "email": "a@test.com", "password": "pw123456" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "USER_ALREADY_EXISTS");
        assert_eq!(body["code"], 409);

        let (status, body) = send(
            &app,
            post_json("/auth/register", json!({ "email": "b@test.com", "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_login_and_refresh_handlers() {
        let app = app(AppStateBuilder::new().build());
        register_user(&app, "a@test.com").await;

        let (status, login) = send(
            &app,
            post_json(
                "/auth/login",
                json!({ "email": "a@test.com", "password": "pw123456" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let old_refresh = login["refreshToken"].as_str().unwrap().to_string();
        let (status, pair) = send(
            &app,
            post_json("/auth/refresh", json!({ "refreshToken": old_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(pair["refreshToken"], login["refreshToken"]);
        assert!(pair.get("user").is_none());

        let (status, body) = send(
            &app,
            post_json("/auth/refresh", json!({ "refreshToken": old_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "REFRESH_TOKEN_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_login_wrong_password_body() {
        let app = app(AppStateBuilder::new().build());
        register_user(&app, "a@test.com").await;

        let (status, body) = send(
            &app,
            post_json(
                "/auth/login",
                json!({ "email": "a@test.com", "password": "wrong-pw" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_CREDENTIALS");
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let app = app(AppStateBuilder::new().build());
        let (status, body) = send(&app, post_json("/auth/refresh", json!({}))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "NO_REFRESH_TOKEN");
    }

    #[tokio::test]
    async fn test_logout_always_succeeds() {
        let app = app(AppStateBuilder::new().build());
        let registered = register_user(&app, "a@test.com").await;
        let refresh_token = registered["refreshToken"].clone();

        for body in [
            json!({ "refreshToken": refresh_token }),
            json!({ "refreshToken": refresh_token }),
            json!({ "refreshToken": "garbage" }),
            json!({}),
        ] {
            let (status, response) = send(&app, post_json("/auth/logout", body)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(response["message"], "Logged out successfully");
        }

        let (status, _) = send(
            &app,
            post_json("/auth/refresh", json!({ "refreshToken": refresh_token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[rstest::rstest]
    #[case(Some("application/json"), r#"{"refreshToken": 5}"#)]
    #[case(Some("application/json"), "not json")]
    #[case(None, r#"{"refreshToken": "abc"}"#)]
    #[case(Some("text/plain"), "")]
    #[tokio::test]
    async fn test_logout_ignores_malformed_body(
        #[case] content_type: Option<&str>,
        #[case] body: &'static str,
    ) {
        let app = app(AppStateBuilder::new().build());
        let (status, response) = send(&app, post_raw("/auth/logout", content_type, body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Logged out successfully");
    }

    #[rstest::rstest]
    #[case("/auth/login", Some("application/json"), "not json")]
    #[case("/auth/login", None, r#"{"email": "a@test.com", "password": "pw123456"}"#)]
    #[case("/auth/register", Some("application/json"), r#"{"email": 42}"#)]
    #[case("/auth/refresh", Some("application/json"), r#"{"refreshToken": null}"#)]
    #[case("/auth/refresh", Some("application/json"), r#"{"refreshToken": 5}"#)]
    #[tokio::test]
    async fn test_malformed_body_is_validation_error(
        #[case] uri: &str,
        #[case] content_type: Option<&str>,
        #[case] body: &'static str,
    ) {
        let app = app(AppStateBuilder::new().build());
        let (status, response) = send(&app, post_raw(uri, content_type, body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "VALIDATION_ERROR");
        assert_eq!(response["code"], 400);
        assert!(response["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_malformed_body_on_protected_route() {
        let app = app(AppStateBuilder::new().build());
        let registered = register_user(&app, "a@test.com").await;
        let access_token = registered["accessToken"].as_str().unwrap();

        let request = Request::builder()
            .method("PUT")
            .uri("/auth/profile")
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"dateOfBirth": "yesterday"}"#))
            .unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = app(AppStateBuilder::new().build());

        let request = Request::builder()
            .uri("/auth/profile")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "NO_TOKEN");

        let (status, body) = send(&app, get_with_token("/auth/profile", "garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_bearer() {
        let app = app(AppStateBuilder::new().build());
        let registered = register_user(&app, "a@test.com").await;
        let refresh_token = registered["refreshToken"].as_str().unwrap();

        let (status, body) = send(&app, get_with_token("/auth/profile", refresh_token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_TOKEN_TYPE");
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let app = app(AppStateBuilder::new().build());
        let registered = register_user(&app, "a@test.com").await;
        let access_token = registered["accessToken"].as_str().unwrap();

        let (status, profile) = send(&app, get_with_token("/auth/profile", access_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["id"], registered["user"]["id"]);

        let request = Request::builder()
            .method("PUT")
            .uri("/auth/profile")
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "lastName": "Lovelace", "dateOfBirth": "1815-12-10" }).to_string(),
            ))
            .unwrap();
        let (status, updated) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["lastName"], "Lovelace");
        assert_eq!(updated["firstName"], "Ada");
        assert_eq!(updated["dateOfBirth"], "1815-12-10");
    }

    #[tokio::test]
    async fn test_change_password_handler() {
        let app = app(AppStateBuilder::new().build());
        let registered = register_user(&app, "a@test.com").await;
        let access_token = registered["accessToken"].as_str().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/auth/change-password")
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "currentPassword": "pw123456", "newPassword": "new-pw-789" })
                    .to_string(),
            ))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Password changed successfully");

        let (status, _) = send(
            &app,
            post_json(
                "/auth/refresh",
                json!({ "refreshToken": registered["refreshToken"] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_all_handler() {
        let app = app(AppStateBuilder::new().build());
        let registered = register_user(&app, "a@test.com").await;
        let access_token = registered["accessToken"].as_str().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/auth/logout-all")
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out from all devices");
    }

    #[tokio::test]
    async fn test_admin_ping_requires_admin_role() {
        let hasher = PasswordHasher::with_cost(8, 1).unwrap();
        let admin = UserModel::new(
            "root@test.com",
            hasher.hash("pw123456").unwrap(),
            Role::Admin,
            Default::default(),
        );
        let users: Arc<dyn UserRepository + Send + Sync> =
            Arc::new(InMemoryUserRepository::with_users(vec![admin]));
        let app = app(AppStateBuilder::new().with_user_repository(users).build());

        let user = register_user(&app, "a@test.com").await;
        let (status, body) = send(
            &app,
            get_with_token("/auth/admin/ping", user["accessToken"].as_str().unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "INSUFFICIENT_PERMISSIONS");

        let (_, login) = send(
            &app,
            post_json(
                "/auth/login",
                json!({ "email": "root@test.com", "password": "pw123456" }),
            ),
        )
        .await;
        let (status, body) = send(
            &app,
            get_with_token("/auth/admin/ping", login["accessToken"].as_str().unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Admin access granted");
    }
}
