//! Document models stored by the API.
//!
//! Field names follow the camelCase JSON shape clients consume. Documents do not
//! carry their own id; the `*Record` views attach it for responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::store::Collection;

/// Implemented by every document type so typed store helpers know where it lives.
pub trait Model: Serialize + DeserializeOwned {
    const COLLECTION: Collection;
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
///
/// The fixed width keeps lexicographic order equal to chronological order, which
/// the store relies on when sorting by `createdAt`.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// A registered user, keyed by handle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub handle: String,
    pub email: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub image_url: String,
    /// Uid issued by the auth service.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Model for User {
    const COLLECTION: Collection = Collection::Users;
}

/// A user-authored post.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scream {
    pub body: String,
    pub user_handle: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_image: String,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
}

impl Model for Scream {
    const COLLECTION: Collection = Collection::Screams;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreamRecord {
    pub scream_id: String,
    #[serde(flatten)]
    pub scream: Scream,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub body: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub scream_id: String,
    pub user_handle: String,
    #[serde(default)]
    pub user_image: String,
}

impl Model for Comment {
    const COLLECTION: Collection = Collection::Comments;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub comment_id: String,
    #[serde(flatten)]
    pub comment: Comment,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user_handle: String,
    pub scream_id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Like {
    /// Deterministic id for the (scream, handle) pair.
    ///
    /// Scream ids never contain `_`, so the first separator splits the pair unambiguously.
    pub fn document_id(scream_id: &str, handle: &str) -> String {
        format!("{scream_id}_{handle}")
    }
}

impl Model for Like {
    const COLLECTION: Collection = Collection::Likes;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: String,
    pub sender: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scream_id: String,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Model for Notification {
    const COLLECTION: Collection = Collection::Notifications;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub notification_id: String,
    #[serde(flatten)]
    pub notification: Notification,
}
