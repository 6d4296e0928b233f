use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::shared::{AppError, AppState};

fn authorization_header(req: &Request) -> &str {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .unwrap_or_default()
}

/// JWT authentication middleware - validates the Authorization Bearer header and
/// adds IdentityClaims to the request.
/// Usage: .route_layer(middleware::from_fn_with_state(app_state.clone(), session::jwt_auth))
/// Handlers can then extract Extension(claims): Extension<IdentityClaims>.
#[instrument(skip(state, req, next), fields(uri = %req.uri()))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state
        .token_verifier
        .verify_access_token(authorization_header(&req))
        .map_err(|e| {
            warn!(kind = e.kind(), "JWT authentication failed");
            e
        })?;

    debug!(user_id = %claims.user_id, role = %claims.role, "Authentication successful");

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Same as `jwt_auth` but additionally requires the admin role
#[instrument(skip(state, req, next), fields(uri = %req.uri()))]
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state
        .token_verifier
        .require_admin(authorization_header(&req))
        .map_err(|e| {
            warn!(kind = e.kind(), "Admin authorization failed");
            e
        })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
