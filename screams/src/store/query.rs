use std::cmp::Ordering;

use serde_json::Value;

use super::{Collection, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Equality filter on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        doc.fields.get(&self.field) == Some(&self.value)
    }
}

/// Filtered, ordered and limited read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    /// Shorthand for the common newest-first listing.
    pub fn newest_first(self) -> Self {
        self.order_by("createdAt", SortOrder::Desc)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters, sorts and truncates candidate documents according to this query.
    ///
    /// Backends that can only narrow candidates (index lookups) hand the rest of the
    /// work to this function so both backends agree on results.
    pub fn apply(&self, candidates: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut hits: Vec<Document> = candidates
            .into_iter()
            .filter(|doc| self.filters.iter().all(|filter| filter.matches(doc)))
            .collect();

        if let Some((field, order)) = &self.order_by {
            hits.sort_by(|left, right| {
                let ordering = compare_values(left.fields.get(field), right.fields.get(field))
                    .then_with(|| left.id.cmp(&right.id));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits
    }
}

/// Total order over optional JSON values: missing < null < bool < number < string.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (left, right) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}
