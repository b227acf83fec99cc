//! Bearer token authentication middleware.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::models::User;
use crate::store::{Collection, Query};

/// The signed-in caller, attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub handle: String,
    pub image_url: String,
}

/// Verifies the `Authorization: Bearer <token>` header and resolves the caller's
/// user document.
///
/// Any failure (missing header, bad signature, expired token, no user for the
/// uid) is answered with 403 `{error: "Unauthorized"}`.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let Some(token) = token else {
        tracing::debug!("missing or malformed authorization header");
        return Err(ApiError::Unauthorized);
    };

    let claims = state.auth.verify_token(token).map_err(|err| {
        tracing::debug!(error = %err, "rejected session token");
        ApiError::Unauthorized
    })?;

    let users = state
        .store
        .find::<User>(&Query::new(Collection::Users).where_eq("userId", claims.uid.as_str()).limit(1))
        .await?;
    let Some((_, user)) = users.into_iter().next() else {
        tracing::debug!(uid = %claims.uid, "token for unknown user");
        return Err(ApiError::Unauthorized);
    };

    request.extensions_mut().insert(AuthUser {
        handle: user.handle,
        image_url: user.image_url,
    });
    Ok(next.run(request).await)
}
