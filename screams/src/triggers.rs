//! Reactive triggers: derived-state maintenance driven by the change feed.
//!
//! Each handler is a short read-then-write sequence against the store. Failures are
//! logged and dropped; nothing is retried.

use chrono::Utc;
use serde_json::{Value, json};

use crate::{
    errors::RepoError,
    models::{Comment, Like, Model, Notification, NotificationKind, Scream},
    store::{
        ChangeEvent, ChangeFeed, ChangeKind, Collection, Document, Fields, Query, Store, WriteBatch, encode,
    },
};

/// Writes a notification for the scream's author unless the actor is the author.
///
/// `source` is the collection holding the like or comment that shares the
/// notification's id. Events are published after the write returns, so a later
/// delete can be queued ahead of this create; when the source is already gone no
/// notification is written.
async fn notify_author(
    store: &Store,
    source: Collection,
    notification_id: &str,
    scream_id: &str,
    sender: &str,
    kind: NotificationKind,
) -> Result<bool, RepoError> {
    if store.get(source, notification_id).await?.is_none() {
        tracing::debug!(collection = %source, id = notification_id, "engagement gone before notification");
        return Ok(false);
    }
    let Some(scream) = store.fetch::<Scream>(scream_id).await? else {
        tracing::debug!(scream_id, "scream gone before notification");
        return Ok(false);
    };
    if scream.user_handle == sender {
        return Ok(false);
    }

    let notification = Notification {
        recipient: scream.user_handle,
        sender: sender.to_string(),
        kind,
        scream_id: scream_id.to_string(),
        read: false,
        created_at: Utc::now(),
    };
    store
        .set(Collection::Notifications, notification_id, encode(&notification)?)
        .await?;
    Ok(true)
}

pub async fn on_like_created(store: &Store, like_id: &str, like: &Like) -> Result<bool, RepoError> {
    notify_author(
        store,
        Collection::Likes,
        like_id,
        &like.scream_id,
        &like.user_handle,
        NotificationKind::Like,
    )
    .await
}

pub async fn on_comment_created(store: &Store, comment_id: &str, comment: &Comment) -> Result<bool, RepoError> {
    notify_author(
        store,
        Collection::Comments,
        comment_id,
        &comment.scream_id,
        &comment.user_handle,
        NotificationKind::Comment,
    )
    .await
}

/// Removes the notification that shares the deleted like/comment's id.
pub async fn on_engagement_deleted(store: &Store, id: &str) -> Result<bool, RepoError> {
    store.delete(Collection::Notifications, id).await
}

/// Copies a changed `imageUrl` onto every scream the user authored.
pub async fn on_user_updated(store: &Store, handle: &str, before: &Fields, after: &Fields) -> Result<usize, RepoError> {
    let Some(image_url) = after.get("imageUrl").and_then(Value::as_str) else {
        return Ok(0);
    };
    if before.get("imageUrl").and_then(Value::as_str) == Some(image_url) {
        return Ok(0);
    }

    let screams = store
        .query(&Query::new(Collection::Screams).where_eq("userHandle", handle))
        .await?;
    fn doc_id(doc: &Document) -> &str {
        doc.id.as_str()
    }
    set_scream_images(store, screams.iter().map(doc_id), image_url).await
}

/// Writes `userImage` on each scream separately; screams deleted since they were
/// listed are skipped.
async fn set_scream_images<'a>(
    store: &Store,
    scream_ids: impl IntoIterator<Item = &'a str>,
    image_url: &str,
) -> Result<usize, RepoError> {
    let mut updated = 0;
    for scream_id in scream_ids {
        match store
            .update(Collection::Screams, scream_id, object(json!({ "userImage": image_url })))
            .await
        {
            Ok(_) => updated += 1,
            Err(RepoError::NotFound { .. }) => {
                tracing::debug!(scream_id, "scream gone before image refresh");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(updated)
}

/// Removes comments, then likes, then notifications of a deleted scream.
///
/// Three independent rounds; a failure part-way leaves the later rounds undone.
pub async fn on_scream_deleted(store: &Store, scream_id: &str) -> Result<usize, RepoError> {
    let mut removed = 0;
    for collection in [Collection::Comments, Collection::Likes, Collection::Notifications] {
        let docs = store
            .query(&Query::new(collection).where_eq("screamId", scream_id))
            .await?;
        let mut batch = WriteBatch::new();
        for doc in docs {
            batch.delete(collection, doc.id);
        }
        removed += store.commit(batch).await?;
    }
    tracing::info!(scream_id, removed, "scream cascade complete");
    Ok(removed)
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn decode<T: Model>(id: &str, fields: &Fields) -> Result<T, RepoError> {
    Document::new(id, fields.clone()).decode()
}

/// Routes one change event to the trigger interested in it.
pub async fn dispatch(store: &Store, event: &ChangeEvent) -> Result<(), RepoError> {
    match (event.collection, event.kind()) {
        (Collection::Likes, ChangeKind::Created) => {
            if let Some(after) = &event.after {
                on_like_created(store, &event.id, &decode(&event.id, after)?).await?;
            }
        }
        (Collection::Comments, ChangeKind::Created) => {
            if let Some(after) = &event.after {
                on_comment_created(store, &event.id, &decode(&event.id, after)?).await?;
            }
        }
        (Collection::Likes | Collection::Comments, ChangeKind::Deleted) => {
            on_engagement_deleted(store, &event.id).await?;
        }
        (Collection::Users, ChangeKind::Updated) => {
            if let (Some(before), Some(after)) = (&event.before, &event.after) {
                on_user_updated(store, &event.id, before, after).await?;
            }
        }
        (Collection::Screams, ChangeKind::Deleted) => {
            on_scream_deleted(store, &event.id).await?;
        }
        _ => {}
    }
    Ok(())
}

/// Drains the change feed and runs triggers one event at a time.
pub struct TriggerRunner {
    store: Store,
    feed: ChangeFeed,
}

impl TriggerRunner {
    pub fn new(store: Store, feed: ChangeFeed) -> Self {
        Self { store, feed }
    }

    async fn handle(&self, event: ChangeEvent) {
        if let Err(err) = dispatch(&self.store, &event).await {
            tracing::error!(
                collection = %event.collection,
                id = %event.id,
                error = %err,
                "trigger failed"
            );
        }
    }

    /// Processes events for as long as the feed stays open. The runner's own store
    /// handle keeps it open, so in a server this runs until the task is aborted.
    pub async fn run(mut self) {
        while let Some(event) = self.feed.recv().await {
            self.handle(event).await;
        }
        tracing::info!("change feed closed; trigger runner stopping");
    }

    /// Processes queued events, including those the triggers themselves emit,
    /// until the feed is empty. Returns how many events were handled.
    pub async fn run_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.feed.try_recv() {
            self.handle(event).await;
            handled += 1;
        }
        handled
    }
}
