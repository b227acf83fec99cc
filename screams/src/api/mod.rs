//! HTTP surface.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::services::ServeDir;

pub use self::auth::{AuthUser, require_auth};
pub use self::error::ApiError;
pub use self::extract::ApiJson;
pub use self::state::AppState;

use self::handlers::{health_check, screams, users};

/// Builds the API router.
///
/// ## Public
/// - `GET /health`
/// - `GET /screams`, `GET /scream/{id}`
/// - `POST /signup`, `POST /login`
/// - `GET /user/{handle}`
/// - `GET /media/{name}` (uploaded images)
///
/// ## Protected (bearer token)
/// - `POST /scream`, `DELETE /scream/{id}`
/// - `POST /scream/{id}/comment`, `GET /scream/{id}/uncomment`
/// - `GET /scream/{id}/like`, `GET /scream/{id}/unlike`
/// - `GET /user`, `POST /user`, `POST /user/image`
/// - `POST /notifications`
///
/// Every route under `/scream/` names its parameter `{id}`; for `uncomment` it
/// carries a comment id.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/screams", get(screams::get_all_screams))
        .route("/scream/{id}", get(screams::get_scream))
        .route("/signup", post(users::signup))
        .route("/login", post(users::login))
        .route("/user/{handle}", get(users::get_user_details));

    let protected = Router::new()
        .route("/scream", post(screams::post_one_scream))
        .route("/scream/{id}", delete(screams::delete_scream))
        .route("/scream/{id}/comment", post(screams::comment_on_scream))
        .route("/scream/{id}/uncomment", get(screams::delete_comment))
        .route("/scream/{id}/like", get(screams::like_scream))
        .route("/scream/{id}/unlike", get(screams::unlike_scream))
        .route("/user", get(users::get_authenticated_user).post(users::add_user_details))
        .route("/user/image", post(users::upload_image))
        .route("/notifications", post(users::mark_notifications_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let media = ServeDir::new(state.blobs.root());

    Router::new()
        .merge(public)
        .merge(protected)
        .nest_service("/media", media)
        .with_state(state)
}
