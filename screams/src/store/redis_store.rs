use std::{borrow::Cow, collections::BTreeSet, sync::Arc, sync::LazyLock};

use redis::{Script, aio::ConnectionManager, cmd};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChangeEvent, Collection, Document, DocumentStore, Fields, Query, WriteBatch, WriteOp};
use crate::{errors::RepoError, keys::KeyContext, models::timestamp};

const DOCUMENT_WRITE_SCRIPT_BODY: &str = include_str!("../../lua/document_write.lua");

static DOCUMENT_WRITE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(DOCUMENT_WRITE_SCRIPT_BODY));

/// Redis backend.
///
/// Documents are JSON strings; every write goes through one Lua script that also
/// maintains the ordering set and the equality indexes, so each call (and each
/// batch) is atomic on the server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: Arc<str>,
}

#[derive(Debug, Serialize)]
struct ScriptOp {
    kind: &'static str,
    collection: &'static str,
    id: String,
    key: String,
    order_key: String,
    index_prefix: String,
    indexed: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Fields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expect: Option<Fields>,
}

#[derive(Debug, Serialize)]
struct ScriptRequest<'a> {
    ops: &'a [ScriptOp],
}

#[derive(Debug, Deserialize)]
struct ScriptResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    exists: bool,
    #[serde(default)]
    conflict: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    changes: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ScriptChange {
    #[serde(default)]
    before: Option<Fields>,
    #[serde(default)]
    after: Option<Fields>,
}

enum ScriptOutcome {
    Applied(Vec<ScriptChange>),
    AlreadyExists,
    Conflict,
}

/// Sorted-set score for a document: its `createdAt` in epoch millis, when present.
fn order_score(fields: &Fields) -> Option<f64> {
    fields
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(timestamp::parse)
        .map(|at| at.timestamp_millis() as f64)
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    /// Opens a managed connection to `url`.
    pub async fn connect(url: &str, prefix: impl Into<Arc<str>>) -> Result<Self, RepoError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn keys(&self) -> KeyContext<'_> {
        KeyContext::new(&self.prefix)
    }

    fn script_op(&self, kind: &'static str, collection: Collection, id: &str) -> ScriptOp {
        let keys = self.keys();
        ScriptOp {
            kind,
            collection: collection.name(),
            id: id.to_string(),
            key: keys.document(collection.name(), id),
            order_key: keys.ordering(collection.name()),
            index_prefix: keys.index_prefix(collection.name()),
            indexed: collection.indexed_fields(),
            fields: None,
            field: None,
            delta: None,
            score: None,
            expect: None,
        }
    }

    fn write_op(&self, kind: &'static str, collection: Collection, id: &str, fields: Fields) -> ScriptOp {
        let mut op = self.script_op(kind, collection, id);
        op.score = order_score(&fields);
        op.fields = Some(fields);
        op
    }

    fn batch_op(&self, op: WriteOp) -> ScriptOp {
        match op {
            WriteOp::Set { collection, id, fields } => self.write_op("set", collection, &id, fields),
            WriteOp::Update { collection, id, fields } => self.write_op("update", collection, &id, fields),
            WriteOp::Delete { collection, id } => self.script_op("delete", collection, &id),
        }
    }

    async fn run(&self, ops: &[ScriptOp]) -> Result<ScriptOutcome, RepoError> {
        let payload = serde_json::to_string(&ScriptRequest { ops })?;
        let mut conn = self.conn.clone();
        let mut invocation = DOCUMENT_WRITE_SCRIPT.prepare_invoke();
        invocation.arg(payload);
        let raw: String = invocation.invoke_async(&mut conn).await?;

        let response: ScriptResponse = serde_json::from_str(&raw).map_err(|err| RepoError::Other {
            message: Cow::Owned(format!("failed to parse lua response: {err}")),
        })?;

        if let Some(code) = response.error {
            return match code.as_str() {
                "not_found" => {
                    let id = response.id.unwrap_or_default();
                    let collection = ops
                        .iter()
                        .find(|op| op.id == id)
                        .map_or("unknown", |op| op.collection);
                    Err(RepoError::not_found(collection, id))
                }
                other => Err(RepoError::Other {
                    message: Cow::Owned(other.to_string()),
                }),
            };
        }
        if response.exists {
            return Ok(ScriptOutcome::AlreadyExists);
        }
        if response.conflict {
            return Ok(ScriptOutcome::Conflict);
        }

        // cjson encodes an empty table as `{}`, so only arrays carry changes.
        let changes = match response.changes {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value::<ScriptChange>)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        Ok(ScriptOutcome::Applied(changes))
    }

    /// Runs a single-op script and turns its only change into an event.
    async fn run_one(&self, op: ScriptOp, collection: Collection) -> Result<Option<ChangeEvent>, RepoError> {
        let id = op.id.clone();
        match self.run(std::slice::from_ref(&op)).await? {
            ScriptOutcome::Applied(mut changes) => {
                let change = changes.pop().unwrap_or_default();
                Ok(ChangeEvent::from_images(collection, id, change.before, change.after))
            }
            ScriptOutcome::AlreadyExists | ScriptOutcome::Conflict => Ok(None),
        }
    }

    async fn candidate_ids(&self, query: &Query) -> Result<Vec<String>, RepoError> {
        let keys = self.keys();
        let collection = query.collection;
        let index_keys: Vec<String> = query
            .filters
            .iter()
            .filter(|filter| collection.indexed_fields().contains(&filter.field.as_str()))
            .filter_map(|filter| {
                filter
                    .value
                    .as_str()
                    .map(|value| keys.index(collection.name(), &filter.field, value))
            })
            .collect();

        let mut conn = self.conn.clone();
        if index_keys.is_empty() {
            let ids: Vec<String> = cmd("ZRANGE")
                .arg(keys.ordering(collection.name()))
                .arg(0)
                .arg(-1)
                .query_async(&mut conn)
                .await?;
            Ok(ids)
        } else {
            let ids: BTreeSet<String> = cmd("SINTER").arg(&index_keys).query_async(&mut conn).await?;
            Ok(ids.into_iter().collect())
        }
    }
}

impl DocumentStore for RedisStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, RepoError> {
        let key = self.keys().document(collection.name(), id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = cmd("GET").arg(&key).query_async(&mut conn).await?;
        match raw {
            Some(json) => Ok(Some(Document::new(id, serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<Option<ChangeEvent>, RepoError> {
        let op = self.write_op("insert", collection, id, fields);
        self.run_one(op, collection).await
    }

    async fn set(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError> {
        let op = self.write_op("set", collection, id, fields);
        self.run_one(op, collection).await?.ok_or_else(|| RepoError::Other {
            message: "set produced no change".into(),
        })
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError> {
        let op = self.write_op("update", collection, id, fields);
        self.run_one(op, collection)
            .await?
            .ok_or_else(|| RepoError::not_found(collection.name(), id))
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<ChangeEvent, RepoError> {
        let mut op = self.script_op("increment", collection, id);
        op.field = Some(field.to_string());
        op.delta = Some(delta);
        self.run_one(op, collection)
            .await?
            .ok_or_else(|| RepoError::not_found(collection.name(), id))
    }

    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        expected: Fields,
        fields: Fields,
    ) -> Result<Option<ChangeEvent>, RepoError> {
        let mut op = self.write_op("update_if", collection, id, fields);
        op.expect = Some(expected);
        self.run_one(op, collection).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<Option<ChangeEvent>, RepoError> {
        let op = self.script_op("delete", collection, id);
        self.run_one(op, collection).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, RepoError> {
        let ids = self.candidate_ids(query).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys = self.keys();
        let doc_keys: Vec<String> = ids
            .iter()
            .map(|id| keys.document(query.collection.name(), id))
            .collect();
        let mut conn = self.conn.clone();
        let raws: Vec<Option<String>> = cmd("MGET").arg(&doc_keys).query_async(&mut conn).await?;

        let mut candidates = Vec::with_capacity(ids.len());
        for (id, raw) in ids.into_iter().zip(raws) {
            // Index entries can outlive a document only between script runs; skip them.
            if let Some(json) = raw {
                candidates.push(Document::new(id, serde_json::from_str(&json)?));
            }
        }
        Ok(query.apply(candidates))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, RepoError> {
        let targets: Vec<(Collection, String)> = batch
            .ops()
            .iter()
            .map(|op| (op.collection(), op.id().to_string()))
            .collect();
        let ops: Vec<ScriptOp> = batch.into_ops().into_iter().map(|op| self.batch_op(op)).collect();

        match self.run(&ops).await? {
            ScriptOutcome::Applied(changes) => Ok(targets
                .into_iter()
                .zip(changes)
                .filter_map(|((collection, id), change)| {
                    ChangeEvent::from_images(collection, id, change.before, change.after)
                })
                .collect()),
            ScriptOutcome::AlreadyExists | ScriptOutcome::Conflict => Err(RepoError::InvalidRequest {
                message: "batches cannot contain inserts or conditional updates".to_string(),
            }),
        }
    }
}
