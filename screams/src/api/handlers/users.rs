//! Account, profile and notification endpoints.

use axum::Json;
use axum::extract::{Extension, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::screams::Message;
use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::auth::AuthError;
use crate::errors::RepoError;
use crate::id::generate_document_id;
use crate::models::{Like, Notification, NotificationRecord, Scream, ScreamRecord, User};
use crate::store::{Collection, Fields, Query, WriteBatch, encode};
use crate::validators::{
    LoginRequest, SignupRequest, UserDetailsRequest, reduce_user_details, validate_login_data, validate_signup_data,
};

const RECENT_NOTIFICATIONS: usize = 10;

fn handle_taken() -> ApiError {
    ApiError::Field {
        field: "handle",
        message: "this handle is already taken",
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct OwnDetails {
    pub credentials: User,
    pub likes: Vec<Like>,
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Serialize)]
pub struct PublicDetails {
    pub user: User,
    pub screams: Vec<ScreamRecord>,
}

/// Writes the new user's document, removing the just-issued credential when the
/// write fails so the e-mail can sign up again.
async fn store_profile(state: &AppState, user: &User) -> Result<(), ApiError> {
    let created = match encode(user) {
        Ok(fields) => state.store.create(Collection::Users, &user.handle, fields).await,
        Err(err) => Err(err),
    };
    let failure = match created {
        Ok(true) => return Ok(()),
        // Another signup claimed the handle after the availability check.
        Ok(false) => handle_taken(),
        Err(err) => ApiError::Signup(err.to_string()),
    };
    if let Err(err) = state.auth.delete_user(&user.email).await {
        tracing::error!(error = %err, "failed to roll back credential");
    }
    Err(failure)
}

/// `POST /signup`
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    validate_signup_data(&request)
        .into_result()
        .map_err(ApiError::Validation)?;

    if state.store.get(Collection::Users, &request.handle).await?.is_some() {
        return Err(handle_taken());
    }

    let session = match state.auth.create_user(&request.email, &request.password).await {
        Ok(session) => session,
        Err(AuthError::EmailAlreadyInUse) => {
            return Err(ApiError::Field {
                field: "email",
                message: "Email is already in use",
            });
        }
        Err(err) => return Err(ApiError::Signup(err.to_string())),
    };

    let user = User {
        handle: request.handle.clone(),
        email: request.email.trim().to_string(),
        created_at: Utc::now(),
        image_url: state.default_image_url(),
        user_id: session.uid.clone(),
        bio: None,
        website: None,
        location: None,
    };
    store_profile(&state, &user).await?;

    tracing::info!(handle = %user.handle, uid = %session.uid, "user signed up");
    Ok((StatusCode::CREATED, Json(TokenResponse { token: session.token })))
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate_login_data(&request)
        .into_result()
        .map_err(ApiError::Validation)?;

    match state.auth.sign_in(&request.email, &request.password).await {
        Ok(session) => Ok(Json(TokenResponse { token: session.token })),
        Err(err) if err.is_credentials() => Err(ApiError::Credentials),
        Err(err) => Err(err.into()),
    }
}

/// File extension kept for an upload: the client's, when it is a plain word,
/// otherwise one derived from the mime type.
fn image_extension(file_name: Option<&str>, mime: &str) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| if mime == "image/png" { "png" } else { "jpg" }.to_string())
}

/// `POST /user/image` (multipart)
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<Message>, ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.file_name().is_none() {
            continue;
        }
        let mime = field.content_type().unwrap_or_default().to_string();
        if mime != "image/jpeg" && mime != "image/png" {
            return Err(ApiError::BadRequest("Wrong file type submitted"));
        }
        let name = format!(
            "{}.{}",
            generate_document_id(),
            image_extension(field.file_name(), &mime)
        );

        let staged = tempfile::NamedTempFile::new()?;
        let mut file = tokio::fs::File::create(staged.path()).await?;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let image_url = state.blobs.upload(staged.path(), &name).await?;
        let mut patch = Fields::new();
        patch.insert("imageUrl".to_string(), Value::from(image_url));
        state.store.update(Collection::Users, &user.handle, patch).await?;

        tracing::info!(handle = %user.handle, name = %name, "profile image uploaded");
        return Ok(Json(Message {
            message: "Image uploaded successfully",
        }));
    }
    Err(ApiError::BadRequest("No image submitted"))
}

/// `POST /user`
pub async fn add_user_details(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(request): ApiJson<UserDetailsRequest>,
) -> Result<Json<Message>, ApiError> {
    let details = reduce_user_details(&request);
    state
        .store
        .update(Collection::Users, &user.handle, encode(&details)?)
        .await?;
    Ok(Json(Message {
        message: "Details added successfully",
    }))
}

/// `GET /user`
pub async fn get_authenticated_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OwnDetails>, ApiError> {
    let credentials = state
        .store
        .fetch::<User>(&user.handle)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    let likes = state
        .store
        .find::<Like>(&Query::new(Collection::Likes).where_eq("userHandle", user.handle.as_str()))
        .await?
        .into_iter()
        .map(|(_, like)| like)
        .collect();

    let notifications = state
        .store
        .find::<Notification>(
            &Query::new(Collection::Notifications)
                .where_eq("recipient", user.handle.as_str())
                .newest_first()
                .limit(RECENT_NOTIFICATIONS),
        )
        .await?
        .into_iter()
        .map(|(notification_id, notification)| NotificationRecord {
            notification_id,
            notification,
        })
        .collect();

    Ok(Json(OwnDetails {
        credentials,
        likes,
        notifications,
    }))
}

/// `GET /user/{handle}`
pub async fn get_user_details(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<PublicDetails>, ApiError> {
    let user = state
        .store
        .fetch::<User>(&handle)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    let screams = state
        .store
        .find::<Scream>(
            &Query::new(Collection::Screams)
                .where_eq("userHandle", handle.as_str())
                .newest_first(),
        )
        .await?
        .into_iter()
        .map(|(scream_id, scream)| ScreamRecord { scream_id, scream })
        .collect();

    Ok(Json(PublicDetails { user, screams }))
}

/// `POST /notifications`
///
/// Marks every listed notification read in one batch; an unknown id aborts it.
pub async fn mark_notifications_read(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    ApiJson(notification_ids): ApiJson<Vec<String>>,
) -> Result<Json<Message>, ApiError> {
    let mut batch = WriteBatch::new();
    for id in notification_ids {
        let mut patch = Fields::new();
        patch.insert("read".to_string(), Value::Bool(true));
        batch.update(Collection::Notifications, id, patch);
    }

    match state.store.commit(batch).await {
        Ok(_) => Ok(Json(Message {
            message: "Notifications marked read",
        })),
        Err(RepoError::NotFound { .. }) => Err(ApiError::NotFound("Notification not found")),
        Err(err) => Err(err.into()),
    }
}
