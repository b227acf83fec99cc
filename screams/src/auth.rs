//! Credential issuance and session-token verification.
//!
//! Accounts live in the `accounts` collection keyed by lower-cased e-mail. Passwords
//! are stored as Argon2id PHC strings, salt included. Session tokens are
//! `base64url(claims).base64url(hmac)` signed with the service key.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    errors::RepoError,
    models::{Model, timestamp},
    store::{Collection, Store, encode},
    validators::is_valid_email,
};

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already in use")]
    EmailAlreadyInUse,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password should be at least 6 characters")]
    WeakPassword,

    #[error("no account for this email")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("invalid session token")]
    InvalidToken,

    #[error("session token expired")]
    TokenExpired,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] RepoError),
}

impl AuthError {
    /// Stable code reported to clients, in the auth service's own namespace.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::InvalidEmail => "auth/invalid-email",
            Self::WeakPassword => "auth/weak-password",
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::InvalidToken => "auth/invalid-id-token",
            Self::TokenExpired => "auth/id-token-expired",
            Self::Hashing(_) => "auth/internal-error",
            Self::Store(err) => err.code(),
        }
    }

    /// Whether the error means the presented credentials were wrong.
    pub fn is_credentials(&self) -> bool {
        matches!(self, Self::UserNotFound | Self::WrongPassword)
    }
}

/// Stored credential record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uid: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Model for Account {
    const COLLECTION: Collection = Collection::Accounts;
}

/// Claims carried by a session token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub uid: String,
    pub email: String,
    /// Issued-at, epoch seconds.
    pub iat: i64,
    /// Expiry, epoch seconds.
    pub exp: i64,
}

/// Result of a successful signup or sign-in.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: String,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: Store,
    signing_key: Arc<[u8]>,
    token_ttl: Duration,
}

fn account_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn keyed_mac(key: &[u8]) -> Result<HmacSha256, AuthError> {
    // HMAC accepts keys of any length; the error arm is unreachable in practice.
    HmacSha256::new_from_slice(key).map_err(|_| AuthError::InvalidToken)
}

/// Argon2id with a fresh random salt, run off the async workers.
async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt =
            SaltString::encode_b64(Uuid::new_v4().as_bytes()).map_err(|err| AuthError::Hashing(err.to_string()))?;
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hashing(err.to_string()))
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

async fn verify_password(account: &Account, password: &str) -> Result<bool, AuthError> {
    let stored = account.password_hash.clone();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored) else {
            return false;
        };
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))
}

impl AuthService {
    pub fn new(store: Store, signing_key: impl AsRef<[u8]>, token_ttl: Duration) -> Self {
        Self {
            store,
            signing_key: Arc::from(signing_key.as_ref()),
            token_ttl,
        }
    }

    /// Registers a new e-mail/password credential and returns a session for it.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        let account = Account {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: hash_password(password).await?,
            created_at: Utc::now(),
        };

        let created = self
            .store
            .create(Collection::Accounts, &account_key(email), encode(&account)?)
            .await?;
        if !created {
            return Err(AuthError::EmailAlreadyInUse);
        }

        tracing::info!(uid = %account.uid, "account created");
        let token = self.mint_token(&account.uid, &account.email)?;
        Ok(Session { uid: account.uid, token })
    }

    /// Checks an e-mail/password pair and returns a fresh session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let account: Account = self
            .store
            .fetch(&account_key(email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(&account, password).await? {
            tracing::debug!(uid = %account.uid, "password mismatch");
            return Err(AuthError::WrongPassword);
        }

        let token = self.mint_token(&account.uid, &account.email)?;
        Ok(Session { uid: account.uid, token })
    }

    /// Removes a credential; used to roll back a signup whose profile write failed.
    pub async fn delete_user(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.store.delete(Collection::Accounts, &account_key(email)).await?)
    }

    pub fn mint_token(&self, uid: &str, email: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            uid: uid.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + self.token_ttl.num_seconds(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).map_err(RepoError::from)?);

        let mut mac = keyed_mac(&self.signing_key)?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Verifies signature and expiry, returning the token's claims.
    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| AuthError::InvalidToken)?;

        let mut mac = keyed_mac(&self.signing_key)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| AuthError::InvalidToken)?;

        let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| AuthError::InvalidToken)?;
        let claims: TokenClaims = serde_json::from_slice(&raw).map_err(|_| AuthError::InvalidToken)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}
