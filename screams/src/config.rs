//! Server configuration: TOML file, then `SCREAMS_*` environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::id::generate_document_id;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub triggers: TriggerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => bail!("unknown store backend `{other}` (expected `memory` or `redis`)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_key_prefix() -> String {
    "screams".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC key for session tokens. Generated per process when unset.
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            signing_secret: None,
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

fn default_token_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_media_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Period of the background counter repair; disabled when unset or zero.
    #[serde(default)]
    pub repair_interval_secs: Option<u64>,
}

impl Config {
    /// Reads `path` when given; otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `SCREAMS_*` overrides looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("SCREAMS_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(backend) = lookup("SCREAMS_STORE") {
            self.store.backend = backend.parse().context("SCREAMS_STORE")?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.store.redis_url = url;
        }
        if let Some(prefix) = lookup("SCREAMS_KEY_PREFIX") {
            self.store.key_prefix = prefix;
        }
        if let Some(secret) = lookup("SCREAMS_SIGNING_SECRET") {
            self.auth.signing_secret = Some(secret);
        }
        if let Some(ttl) = lookup("SCREAMS_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| format!("SCREAMS_TOKEN_TTL_SECS is not a number: {ttl}"))?;
        }
        if let Some(dir) = lookup("SCREAMS_MEDIA_DIR") {
            self.media.dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("SCREAMS_PUBLIC_URL") {
            self.media.public_base_url = url;
        }
        if let Some(interval) = lookup("SCREAMS_REPAIR_INTERVAL_SECS") {
            let secs: u64 = interval
                .trim()
                .parse()
                .with_context(|| format!("SCREAMS_REPAIR_INTERVAL_SECS is not a number: {interval}"))?;
            self.triggers.repair_interval_secs = Some(secs);
        }
        Ok(())
    }

    /// Loads the file and then the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Signing secret to use, generating an ephemeral one if none is configured.
    pub fn signing_secret(&mut self) -> &str {
        self.auth.signing_secret.get_or_insert_with(|| {
            tracing::warn!("no signing secret configured; sessions will not survive a restart");
            format!("{}{}", generate_document_id(), generate_document_id())
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.auth.token_ttl_secs).unwrap_or(i64::MAX))
    }

    pub fn repair_interval(&self) -> Option<std::time::Duration> {
        self.triggers
            .repair_interval_secs
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }
}
