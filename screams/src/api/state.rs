//! Shared application state.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::blob::BlobStore;
use crate::config::Config;
use crate::store::Store;

/// File name of the profile image every new user starts with.
pub const DEFAULT_PROFILE_IMAGE: &str = "no-img.png";

/// Handles every request shares; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub auth: AuthService,
    pub blobs: BlobStore,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the auth service and blob store from `config` around an existing store.
    pub fn new(store: Store, mut config: Config) -> Self {
        let ttl = config.token_ttl();
        let auth = AuthService::new(store.clone(), config.signing_secret().as_bytes(), ttl);
        let blobs = BlobStore::new(config.media.dir.clone(), &config.media.public_base_url);
        Self {
            store,
            auth,
            blobs,
            config: Arc::new(config),
        }
    }

    pub fn default_image_url(&self) -> String {
        self.blobs.public_url(DEFAULT_PROFILE_IMAGE)
    }
}
