//! Scream, comment and like endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::models::{Comment, CommentRecord, Like, Scream, ScreamRecord};
use crate::store::{Collection, Document, Query, encode};

const SCREAM_NOT_FOUND: &str = "Scream not found";

#[derive(Debug, Default, Deserialize)]
pub struct BodyRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct ScreamDetail {
    #[serde(flatten)]
    pub scream: ScreamRecord,
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

async fn load_scream(state: &AppState, scream_id: &str) -> Result<Scream, ApiError> {
    state
        .store
        .fetch::<Scream>(scream_id)
        .await?
        .ok_or(ApiError::NotFound(SCREAM_NOT_FOUND))
}

/// Applies `delta` to a scream counter and returns the scream as it now stands.
async fn bump(state: &AppState, scream_id: &str, field: &str, delta: i64) -> Result<ScreamRecord, ApiError> {
    let after = state
        .store
        .increment(Collection::Screams, scream_id, field, delta)
        .await?;
    Ok(ScreamRecord {
        scream_id: scream_id.to_string(),
        scream: Document::new(scream_id, after).decode()?,
    })
}

/// `GET /screams`
pub async fn get_all_screams(State(state): State<AppState>) -> Result<Json<Vec<ScreamRecord>>, ApiError> {
    let screams = state
        .store
        .find::<Scream>(&Query::new(Collection::Screams).newest_first())
        .await?;
    Ok(Json(
        screams
            .into_iter()
            .map(|(scream_id, scream)| ScreamRecord { scream_id, scream })
            .collect(),
    ))
}

/// `POST /scream`
pub async fn post_one_scream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(request): ApiJson<BodyRequest>,
) -> Result<Json<ScreamRecord>, ApiError> {
    if request.body.trim().is_empty() {
        return Err(ApiError::Field {
            field: "body",
            message: "Body must not be empty",
        });
    }

    let scream = Scream {
        body: request.body,
        user_handle: user.handle,
        created_at: Utc::now(),
        user_image: user.image_url,
        like_count: 0,
        comment_count: 0,
    };
    let doc = state.store.add(Collection::Screams, encode(&scream)?).await?;
    tracing::info!(scream_id = %doc.id, handle = %scream.user_handle, "scream posted");
    Ok(Json(ScreamRecord {
        scream_id: doc.id,
        scream,
    }))
}

/// `GET /scream/{id}`
pub async fn get_scream(
    State(state): State<AppState>,
    Path(scream_id): Path<String>,
) -> Result<Json<ScreamDetail>, ApiError> {
    let scream = load_scream(&state, &scream_id).await?;
    let comments = state
        .store
        .find::<Comment>(
            &Query::new(Collection::Comments)
                .where_eq("screamId", scream_id.as_str())
                .newest_first(),
        )
        .await?
        .into_iter()
        .map(|(comment_id, comment)| CommentRecord { comment_id, comment })
        .collect();

    Ok(Json(ScreamDetail {
        scream: ScreamRecord { scream_id, scream },
        comments,
    }))
}

/// `POST /scream/{id}/comment`
///
/// The counter is bumped before the comment is written; the two writes are not
/// atomic together.
pub async fn comment_on_scream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(scream_id): Path<String>,
    ApiJson(request): ApiJson<BodyRequest>,
) -> Result<Json<CommentRecord>, ApiError> {
    if request.body.trim().is_empty() {
        return Err(ApiError::BadRequest("Must not be empty"));
    }
    load_scream(&state, &scream_id).await?;

    let comment = Comment {
        body: request.body,
        created_at: Utc::now(),
        scream_id,
        user_handle: user.handle,
        user_image: user.image_url,
    };
    bump(&state, &comment.scream_id, "commentCount", 1).await?;
    let doc = state.store.add(Collection::Comments, encode(&comment)?).await?;
    Ok(Json(CommentRecord {
        comment_id: doc.id,
        comment,
    }))
}

/// `GET /scream/{id}/like`
pub async fn like_scream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(scream_id): Path<String>,
) -> Result<Json<ScreamRecord>, ApiError> {
    load_scream(&state, &scream_id).await?;

    let like = Like {
        user_handle: user.handle,
        scream_id,
        created_at: Utc::now(),
    };
    let like_id = Like::document_id(&like.scream_id, &like.user_handle);
    if !state.store.create(Collection::Likes, &like_id, encode(&like)?).await? {
        return Err(ApiError::BadRequest("Scream already liked"));
    }
    Ok(Json(bump(&state, &like.scream_id, "likeCount", 1).await?))
}

/// `GET /scream/{id}/unlike`
pub async fn unlike_scream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(scream_id): Path<String>,
) -> Result<Json<ScreamRecord>, ApiError> {
    load_scream(&state, &scream_id).await?;

    let like_id = Like::document_id(&scream_id, &user.handle);
    if !state.store.delete(Collection::Likes, &like_id).await? {
        return Err(ApiError::BadRequest("Scream not liked"));
    }
    Ok(Json(bump(&state, &scream_id, "likeCount", -1).await?))
}

/// `DELETE /scream/{id}`
///
/// Comments, likes and notifications go with it once the delete trigger runs.
pub async fn delete_scream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(scream_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    let scream = load_scream(&state, &scream_id).await?;
    if scream.user_handle != user.handle {
        return Err(ApiError::Unauthorized);
    }
    state.store.delete(Collection::Screams, &scream_id).await?;
    tracing::info!(scream_id = %scream_id, handle = %user.handle, "scream deleted");
    Ok(Json(Message {
        message: "Scream deleted successfully",
    }))
}

/// `GET /scream/{id}/uncomment`, where `id` names the comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(comment_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    let comment = state
        .store
        .fetch::<Comment>(&comment_id)
        .await?
        .ok_or(ApiError::NotFound("Comment not found"))?;
    load_scream(&state, &comment.scream_id).await?;

    if state.store.delete(Collection::Comments, &comment_id).await? {
        bump(&state, &comment.scream_id, "commentCount", -1).await?;
    }
    Ok(Json(Message {
        message: "Comment deleted successfully",
    }))
}
