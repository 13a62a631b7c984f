use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use parley_core::AppState;

use crate::error::ApiError;

/// Bearer-authenticated caller. Same credential check as the gateway,
/// including revocation.
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let identity = parley_core::auth::authenticate(state.auth.as_ref(), token.trim()).await?;

        Ok(AuthUser {
            user_id: identity.user_id,
            username: identity.username,
        })
    }
}
