use std::{borrow::Cow, collections::BTreeMap};

use serde::Serialize;
use thiserror::Error;

/// Top-level error type returned by the document store.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Target document was not found when performing a mutation.
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },

    /// Invalid input supplied to a store operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl RepoError {
    /// Stable machine-readable code surfaced to API clients on 500 responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "store/unavailable",
            Self::NotFound { .. } => "store/not-found",
            Self::InvalidRequest { .. } => "store/invalid-argument",
            Self::Serialization(_) => "store/data-loss",
            Self::Other { .. } => "store/internal",
        }
    }

    pub(crate) fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }
}

/// Collection of validation issues encountered while checking a payload.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Field → message map in the shape API clients expect.
    ///
    /// When a field carries several issues the first one wins.
    pub fn field_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for issue in &self.issues {
            map.entry(issue.field.clone()).or_insert_with(|| issue.message.clone());
        }
        map
    }
}

/// Detailed validation failure for a single field.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a payload check: `valid` plus the field-scoped messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl From<Vec<ValidationIssue>> for ValidationReport {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        let errors = ValidationError::new(issues).field_map();
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

impl ValidationReport {
    /// Converts a failed report into an error, keeping passing reports as `Ok`.
    pub fn into_result(self) -> Result<(), BTreeMap<String, String>> {
        if self.valid { Ok(()) } else { Err(self.errors) }
    }
}
