//! Document store client.
//!
//! `Store` is the handle every handler and trigger talks to. It wraps one of the
//! backends implementing [`DocumentStore`] and publishes a [`ChangeEvent`] on the
//! change feed after every successful mutation.

mod memory;
mod query;
mod redis_store;

pub use memory::MemoryStore;
pub use query::{Filter, Query, SortOrder, compare_values};
pub use redis_store::RedisStore;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::{
    errors::RepoError,
    id::generate_document_id,
    models::Model,
};

/// Document body: a JSON object without its id.
pub type Fields = Map<String, Value>;

/// Named collections known to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Screams,
    Comments,
    Likes,
    Notifications,
    Accounts,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Screams,
        Collection::Comments,
        Collection::Likes,
        Collection::Notifications,
        Collection::Accounts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Screams => "screams",
            Self::Comments => "comments",
            Self::Likes => "likes",
            Self::Notifications => "notifications",
            Self::Accounts => "accounts",
        }
    }

    /// Fields the Redis backend keeps equality indexes for.
    pub fn indexed_fields(self) -> &'static [&'static str] {
        match self {
            Self::Users => &["userId"],
            Self::Screams => &["userHandle"],
            Self::Comments => &["screamId", "userHandle"],
            Self::Likes => &["screamId", "userHandle"],
            Self::Notifications => &["recipient", "screamId"],
            Self::Accounts => &["uid"],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored document with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self { id: id.into(), fields }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    /// Decodes the body into a typed model.
    pub fn decode<T: Model>(&self) -> Result<T, RepoError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Encodes a model into a document body.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields, RepoError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RepoError::InvalidRequest {
            message: format!("documents must be JSON objects, got {other}"),
        }),
    }
}

/// Kind of mutation observed on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A committed document mutation, as delivered to triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub id: String,
    pub before: Option<Fields>,
    pub after: Option<Fields>,
}

impl ChangeEvent {
    /// Builds an event from before/after images; `None` when nothing existed on either side.
    pub fn from_images(
        collection: Collection,
        id: impl Into<String>,
        before: Option<Fields>,
        after: Option<Fields>,
    ) -> Option<Self> {
        if before.is_none() && after.is_none() {
            return None;
        }
        Some(Self {
            collection,
            id: id.into(),
            before,
            after,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, _) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
            (Some(_), None) => ChangeKind::Deleted,
        }
    }
}

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set { collection: Collection, id: String, fields: Fields },
    Update { collection: Collection, id: String, fields: Fields },
    Delete { collection: Collection, id: String },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Set { collection, .. } | Self::Update { collection, .. } | Self::Delete { collection, .. } => {
                *collection
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Set { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// Group of writes committed atomically.
///
/// An `update` against a missing document aborts the whole batch with
/// [`RepoError::NotFound`]; nothing is written in that case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: Collection, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection,
            id: id.into(),
            fields,
        });
        self
    }

    pub fn update(&mut self, collection: Collection, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection,
            id: id.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: Collection, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Primitive operations a storage backend provides.
///
/// Every mutation is atomic on its own and reports what changed so the caller can
/// publish it; `commit` is atomic across the whole batch.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, RepoError>;

    /// Inserts only when no document with `id` exists. `None` means nothing was written.
    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<Option<ChangeEvent>, RepoError>;

    /// Replaces (or creates) the document.
    async fn set(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError>;

    /// Merges `fields` into an existing document.
    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError>;

    /// Adds `delta` to a numeric field of an existing document (missing fields count as zero).
    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<ChangeEvent, RepoError>;

    /// Merges `fields` only while every field in `expected` still holds the given
    /// value (a missing field matches `null`). `None` means the document had moved
    /// on and nothing was written. Expectations compare scalars only.
    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        expected: Fields,
        fields: Fields,
    ) -> Result<Option<ChangeEvent>, RepoError>;

    /// Removes the document. `None` means it did not exist.
    async fn delete(&self, collection: Collection, id: &str) -> Result<Option<ChangeEvent>, RepoError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, RepoError>;

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, RepoError>;
}

/// Concrete backend selected at startup.
#[derive(Clone)]
pub enum Backend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl DocumentStore for Backend {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, RepoError> {
        match self {
            Self::Memory(store) => store.get(collection, id).await,
            Self::Redis(store) => store.get(collection, id).await,
        }
    }

    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<Option<ChangeEvent>, RepoError> {
        match self {
            Self::Memory(store) => store.insert(collection, id, fields).await,
            Self::Redis(store) => store.insert(collection, id, fields).await,
        }
    }

    async fn set(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError> {
        match self {
            Self::Memory(store) => store.set(collection, id, fields).await,
            Self::Redis(store) => store.set(collection, id, fields).await,
        }
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError> {
        match self {
            Self::Memory(store) => store.update(collection, id, fields).await,
            Self::Redis(store) => store.update(collection, id, fields).await,
        }
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<ChangeEvent, RepoError> {
        match self {
            Self::Memory(store) => store.increment(collection, id, field, delta).await,
            Self::Redis(store) => store.increment(collection, id, field, delta).await,
        }
    }

    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        expected: Fields,
        fields: Fields,
    ) -> Result<Option<ChangeEvent>, RepoError> {
        match self {
            Self::Memory(store) => store.update_if(collection, id, expected, fields).await,
            Self::Redis(store) => store.update_if(collection, id, expected, fields).await,
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<Option<ChangeEvent>, RepoError> {
        match self {
            Self::Memory(store) => store.delete(collection, id).await,
            Self::Redis(store) => store.delete(collection, id).await,
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, RepoError> {
        match self {
            Self::Memory(store) => store.query(query).await,
            Self::Redis(store) => store.query(query).await,
        }
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, RepoError> {
        match self {
            Self::Memory(store) => store.commit(batch).await,
            Self::Redis(store) => store.commit(batch).await,
        }
    }
}

/// Receiving half of the change feed.
pub type ChangeFeed = mpsc::UnboundedReceiver<ChangeEvent>;

/// Shared handle to the document store.
///
/// Cloning is cheap; all clones publish to the same change feed.
#[derive(Clone)]
pub struct Store {
    backend: Backend,
    feed: Option<mpsc::UnboundedSender<ChangeEvent>>,
}

impl Store {
    /// Store without a change feed; mutations are not observed by triggers.
    pub fn new(backend: Backend) -> Self {
        Self { backend, feed: None }
    }

    /// Store publishing every mutation on the returned feed.
    pub fn with_feed(backend: Backend) -> (Self, ChangeFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { backend, feed: Some(tx) }, rx)
    }

    /// In-process store, mostly useful for tests and local runs.
    pub fn memory() -> (Self, ChangeFeed) {
        Self::with_feed(Backend::Memory(MemoryStore::new()))
    }

    fn publish(&self, event: ChangeEvent) {
        if let Some(feed) = &self.feed
            && feed.send(event).is_err()
        {
            tracing::warn!("change feed closed; dropping event");
        }
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, RepoError> {
        self.backend.get(collection, id).await
    }

    /// Reads and decodes a typed document.
    pub async fn fetch<T: Model>(&self, id: &str) -> Result<Option<T>, RepoError> {
        match self.backend.get(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Adds a document under a freshly generated id.
    pub async fn add(&self, collection: Collection, fields: Fields) -> Result<Document, RepoError> {
        let id = generate_document_id();
        match self.backend.insert(collection, &id, fields.clone()).await? {
            Some(event) => {
                self.publish(event);
                Ok(Document::new(id, fields))
            }
            None => Err(RepoError::Other {
                message: format!("generated id collided in {collection}: {id}").into(),
            }),
        }
    }

    /// Inserts only when absent; returns whether the document was written.
    pub async fn create(&self, collection: Collection, id: &str, fields: Fields) -> Result<bool, RepoError> {
        match self.backend.insert(collection, id, fields).await? {
            Some(event) => {
                self.publish(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn set(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), RepoError> {
        let event = self.backend.set(collection, id, fields).await?;
        self.publish(event);
        Ok(())
    }

    /// Merges fields into an existing document and returns its new body.
    pub async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<Fields, RepoError> {
        let event = self.backend.update(collection, id, fields).await?;
        let after = event.after.clone().unwrap_or_default();
        self.publish(event);
        Ok(after)
    }

    /// Atomically adds `delta` to a numeric field and returns the new body.
    pub async fn increment(&self, collection: Collection, id: &str, field: &str, delta: i64) -> Result<Fields, RepoError> {
        let event = self.backend.increment(collection, id, field, delta).await?;
        let after = event.after.clone().unwrap_or_default();
        self.publish(event);
        Ok(after)
    }

    /// Conditional merge; returns `false` when `expected` no longer matches.
    pub async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        expected: Fields,
        fields: Fields,
    ) -> Result<bool, RepoError> {
        match self.backend.update_if(collection, id, expected, fields).await? {
            Some(event) => {
                self.publish(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes a document; returns whether it existed.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, RepoError> {
        match self.backend.delete(collection, id).await? {
            Some(event) => {
                self.publish(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Document>, RepoError> {
        self.backend.query(query).await
    }

    /// Runs a query and decodes each hit, keeping its id.
    pub async fn find<T: Model>(&self, query: &Query) -> Result<Vec<(String, T)>, RepoError> {
        self.backend
            .query(query)
            .await?
            .into_iter()
            .map(|doc| {
                let value = doc.decode::<T>()?;
                Ok((doc.id, value))
            })
            .collect()
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<usize, RepoError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let events = self.backend.commit(batch).await?;
        let written = events.len();
        for event in events {
            self.publish(event);
        }
        Ok(written)
    }
}
