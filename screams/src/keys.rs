/// Redis key-construction helpers for the document store.
///
/// Layout under a prefix `p`:
/// - `p:doc:{collection}:{id}` — JSON document body
/// - `p:order:{collection}` — sorted set of ids scored by `createdAt` millis
/// - `p:idx:{collection}:{field}:{value}` — set of ids whose `field` equals `value`
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    pub fn document(&self, collection: &str, id: &str) -> String {
        format!("{}:doc:{}:{}", self.prefix, collection, id)
    }

    pub fn ordering(&self, collection: &str) -> String {
        format!("{}:order:{}", self.prefix, collection)
    }

    /// Prefix shared by every index key of a collection; the Lua scripts append `{field}:{value}`.
    pub fn index_prefix(&self, collection: &str) -> String {
        format!("{}:idx:{}:", self.prefix, collection)
    }

    pub fn index(&self, collection: &str, field: &str, value: &str) -> String {
        format!("{}{}:{}", self.index_prefix(collection), field, value)
    }
}
