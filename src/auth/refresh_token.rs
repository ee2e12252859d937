/// Refresh Token Management
///
/// Refresh tokens are opaque:
/// - 32 random bytes from the OS generator, base64url encoded
/// - Hashed with SHA-256 before storage (the plaintext is never stored)
/// - Looked up by exact hash match
/// - Single-use: every rotation deletes the presented record

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::RefreshTokenRecord;
use crate::store::{with_timeout, Lookup, RefreshTokenStore, StoreError};

const TOKEN_BYTES: usize = 32;

/// A freshly minted refresh token. `secret` goes to the client and nowhere else.
#[derive(Debug, Clone)]
pub struct MintedRefreshToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a new refresh token secret
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a refresh token secret
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Refresh token operations over a store, each bounded by `timeout`
#[derive(Clone)]
pub struct RefreshTokens {
    store: Arc<dyn RefreshTokenStore>,
    ttl: Duration,
    timeout: std::time::Duration,
}

impl RefreshTokens {
    pub fn new(
        store: Arc<dyn RefreshTokenStore>,
        ttl_seconds: i64,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_seconds),
            timeout,
        }
    }

    /// Generate a secret, persist its hash, and hand the secret back
    pub async fn mint(&self, account_id: Uuid) -> Result<MintedRefreshToken, StoreError> {
        let secret = generate_refresh_token();
        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            account_id,
            token_hash: hash_token(&secret),
            created_at: now,
            expires_at: now + self.ttl,
            revoked: false,
        };

        with_timeout(self.timeout, self.store.insert(&record)).await?;

        Ok(MintedRefreshToken {
            secret,
            expires_at: record.expires_at,
        })
    }

    /// Find the record for a presented secret
    pub async fn lookup(&self, secret: &str) -> Result<Lookup<RefreshTokenRecord>, StoreError> {
        let token_hash = hash_token(secret);
        with_timeout(self.timeout, self.store.find_by_hash(&token_hash)).await
    }

    /// Delete the record for a presented secret; `false` if there was none
    pub async fn consume(&self, secret: &str) -> Result<bool, StoreError> {
        let token_hash = hash_token(secret);
        with_timeout(self.timeout, self.store.delete_by_hash(&token_hash)).await
    }

    pub(crate) async fn delete_record(&self, record: &RefreshTokenRecord) -> Result<bool, StoreError> {
        with_timeout(self.timeout, self.store.delete_by_hash(&record.token_hash)).await
    }

    /// Delete every record of an account
    pub async fn revoke_all(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let removed = with_timeout(self.timeout, self.store.delete_for_account(account_id)).await?;
        tracing::info!(account_id = %account_id, removed, "All refresh tokens revoked for account");
        Ok(removed)
    }

    /// Delete every expired or revoked record
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        with_timeout(self.timeout, self.store.delete_expired(Utc::now())).await
    }
}
