use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use serde_json::Value;

use super::{ChangeEvent, Collection, Document, DocumentStore, Fields, Query, WriteBatch, WriteOp};
use crate::errors::RepoError;

type Tables = HashMap<Collection, BTreeMap<String, Fields>>;

/// In-process backend. One lock guards every collection, so each call and each
/// batch is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: Collection) -> usize {
        self.tables.read().get(&collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }
}

fn apply_op(tables: &mut Tables, op: WriteOp) -> Result<Option<ChangeEvent>, RepoError> {
    match op {
        WriteOp::Set { collection, id, fields } => {
            let before = tables.entry(collection).or_default().insert(id.clone(), fields.clone());
            Ok(ChangeEvent::from_images(collection, id, before, Some(fields)))
        }
        WriteOp::Update { collection, id, fields } => {
            let doc = tables
                .get_mut(&collection)
                .and_then(|table| table.get_mut(&id))
                .ok_or_else(|| RepoError::not_found(collection.name(), id.clone()))?;
            let before = doc.clone();
            for (key, value) in fields {
                doc.insert(key, value);
            }
            Ok(ChangeEvent::from_images(collection, id, Some(before), Some(doc.clone())))
        }
        WriteOp::Delete { collection, id } => {
            let before = tables.get_mut(&collection).and_then(|table| table.remove(&id));
            Ok(ChangeEvent::from_images(collection, id, before, None))
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, RepoError> {
        let tables = self.tables.read();
        Ok(tables
            .get(&collection)
            .and_then(|table| table.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<Option<ChangeEvent>, RepoError> {
        let mut tables = self.tables.write();
        let table = tables.entry(collection).or_default();
        if table.contains_key(id) {
            return Ok(None);
        }
        table.insert(id.to_string(), fields.clone());
        Ok(ChangeEvent::from_images(collection, id, None, Some(fields)))
    }

    async fn set(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError> {
        let mut tables = self.tables.write();
        let op = WriteOp::Set {
            collection,
            id: id.to_string(),
            fields,
        };
        apply_op(&mut tables, op)?.ok_or_else(|| RepoError::Other {
            message: "set produced no change".into(),
        })
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<ChangeEvent, RepoError> {
        let mut tables = self.tables.write();
        let op = WriteOp::Update {
            collection,
            id: id.to_string(),
            fields,
        };
        apply_op(&mut tables, op)?.ok_or_else(|| RepoError::not_found(collection.name(), id))
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<ChangeEvent, RepoError> {
        let mut tables = self.tables.write();
        let doc = tables
            .get_mut(&collection)
            .and_then(|table| table.get_mut(id))
            .ok_or_else(|| RepoError::not_found(collection.name(), id))?;
        let before = doc.clone();
        let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
        doc.insert(field.to_string(), Value::from(current + delta));
        let after = doc.clone();
        Ok(ChangeEvent {
            collection,
            id: id.to_string(),
            before: Some(before),
            after: Some(after),
        })
    }

    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        expected: Fields,
        fields: Fields,
    ) -> Result<Option<ChangeEvent>, RepoError> {
        let mut tables = self.tables.write();
        let doc = tables
            .get(&collection)
            .and_then(|table| table.get(id))
            .ok_or_else(|| RepoError::not_found(collection.name(), id))?;
        let matches = expected
            .iter()
            .all(|(key, value)| doc.get(key).unwrap_or(&Value::Null) == value);
        if !matches {
            return Ok(None);
        }
        let op = WriteOp::Update {
            collection,
            id: id.to_string(),
            fields,
        };
        apply_op(&mut tables, op)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<Option<ChangeEvent>, RepoError> {
        let mut tables = self.tables.write();
        apply_op(
            &mut tables,
            WriteOp::Delete {
                collection,
                id: id.to_string(),
            },
        )
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, RepoError> {
        let candidates: Vec<Document> = {
            let tables = self.tables.read();
            tables
                .get(&query.collection)
                .map(|table| {
                    table
                        .iter()
                        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(query.apply(candidates))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<ChangeEvent>, RepoError> {
        let mut tables = self.tables.write();

        // Dry run over existence only, so a failing update leaves nothing half-written.
        let mut exists: HashMap<(Collection, &str), bool> = HashMap::new();
        for op in batch.ops() {
            let key = (op.collection(), op.id());
            let present = *exists.entry(key).or_insert_with(|| {
                tables
                    .get(&op.collection())
                    .is_some_and(|table| table.contains_key(op.id()))
            });
            match op {
                WriteOp::Set { .. } => {
                    exists.insert(key, true);
                }
                WriteOp::Update { collection, id, .. } => {
                    if !present {
                        return Err(RepoError::not_found(collection.name(), id.clone()));
                    }
                }
                WriteOp::Delete { .. } => {
                    exists.insert(key, false);
                }
            }
        }
        drop(exists);

        let mut events = Vec::with_capacity(batch.len());
        for op in batch.into_ops() {
            if let Some(event) = apply_op(&mut tables, op)? {
                events.push(event);
            }
        }
        Ok(events)
    }
}
