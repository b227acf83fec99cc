//! API error type and the JSON bodies clients see for each failure.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::auth::AuthError;
use crate::blob::BlobError;
use crate::errors::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Field-scoped validation messages, returned as the body itself.
    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    /// A single field-scoped message, e.g. `{handle: "..."}`.
    #[error("{field}: {message}")]
    Field { field: &'static str, message: &'static str },

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Missing/invalid token, or acting on someone else's resource.
    #[error("unauthorized")]
    Unauthorized,

    #[error("wrong credentials")]
    Credentials,

    /// Signup failure that is not the caller's fault.
    #[error("signup failed: {0}")]
    Signup(String),

    /// Request body missing, not JSON, or not the expected shape.
    #[error("malformed json body: {0}")]
    Json(#[from] JsonRejection),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Store(#[from] RepoError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn error_body(message: impl Into<Value>) -> Value {
    json!({ "error": message.into() })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(errors) => (StatusCode::BAD_REQUEST, json!(errors)),
            Self::Field { field, message } => {
                let mut body = Map::new();
                body.insert((*field).to_string(), Value::from(*message));
                (StatusCode::BAD_REQUEST, Value::Object(body))
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, error_body(*message)),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, error_body(*message)),
            Self::Unauthorized => (StatusCode::FORBIDDEN, error_body("Unauthorized")),
            Self::Credentials => (
                StatusCode::FORBIDDEN,
                json!({ "general": "Wrong credentials, please try again" }),
            ),
            Self::Signup(reason) => {
                tracing::error!(reason = %reason, "signup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "general": "Something went wrong, please try again" }),
                )
            }
            Self::Json(err) => (StatusCode::BAD_REQUEST, error_body(err.body_text())),
            Self::Multipart(err) => (StatusCode::BAD_REQUEST, error_body(err.body_text())),
            Self::Store(err) => {
                tracing::error!(error = %err, "store error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(err.code()))
            }
            Self::Auth(err) => {
                tracing::error!(error = %err, "auth error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(err.code()))
            }
            Self::Blob(err) => {
                tracing::error!(error = %err, "blob store error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(err.code()))
            }
            Self::Io(err) => {
                tracing::error!(error = %err, "io error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body("storage/unknown"))
            }
        };
        (status, Json(body)).into_response()
    }
}
