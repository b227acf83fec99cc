//! Blob storage for uploaded profile images.
//!
//! Files are copied into a local media directory and served back under
//! `{public_base_url}/media/{name}`.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob name: {0}")]
    InvalidName(String),

    #[error("blob io error: {0}")]
    Io(#[from] io::Error),
}

impl BlobError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "storage/invalid-argument",
            Self::Io(_) => "storage/unknown",
        }
    }
}

#[derive(Clone)]
pub struct BlobStore {
    root: Arc<PathBuf>,
    public_base_url: Arc<str>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: Arc::new(root.into()),
            public_base_url: Arc::from(public_base_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL a blob named `name` is (or would be) served at.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/media/{}", self.public_base_url, name)
    }

    /// Copies a local file into the store under `name` and returns its public URL.
    pub async fn upload(&self, source: &Path, name: &str) -> Result<String, BlobError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(BlobError::InvalidName(name.to_string()));
        }
        tokio::fs::create_dir_all(self.root.as_path()).await?;
        let target = self.root.join(name);
        let bytes = tokio::fs::copy(source, &target).await?;
        tracing::debug!(name, bytes, "blob stored");
        Ok(self.public_url(name))
    }
}
