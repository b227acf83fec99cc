//! Screams: a small social micro-blogging API.
//!
//! Users sign up, post short "screams", comment on and like each other's screams,
//! and receive notifications about engagement on their own.
//!
//! - [`store`]: document store with memory and Redis backends and a change feed
//! - [`triggers`]: derived-state maintenance driven by that feed
//! - [`api`]: the axum router and handlers
//! - [`repair`]: counter reconciliation

pub mod api;
pub mod auth;
pub mod blob;
pub mod config;
pub mod errors;
pub mod id;
pub mod keys;
pub mod models;
pub mod repair;
pub mod store;
pub mod triggers;
pub mod validators;

pub use api::{AppState, router};
pub use config::Config;
pub use errors::{RepoError, ValidationError, ValidationIssue, ValidationReport};
pub use store::{Backend, ChangeEvent, Collection, DocumentStore, MemoryStore, Query, RedisStore, Store};
pub use triggers::TriggerRunner;
