/// Session Manager
///
/// Login, refresh-token rotation, logout and mass revocation. This is the
/// only place that touches persistent refresh token state.
///
/// Rotation order: the new refresh token is persisted before the presented
/// one is deleted, so a failure in between leaves the client with an extra
/// valid token rather than none.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::jwt::{generate_access_token, AccessToken};
use crate::auth::password::CredentialHasher;
use crate::auth::refresh_token::{MintedRefreshToken, RefreshTokens};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ValidationError};
use crate::models::Account;
use crate::store::{with_timeout, AccountStore, Lookup, RefreshTokenStore};
use crate::validators::{display_name, is_valid_email, is_valid_password, normalize_email};

/// Tokens handed to a client after login or rotation
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub account_id: Uuid,
    pub access_token: AccessToken,
    pub refresh_token: MintedRefreshToken,
}

pub struct SessionManager {
    accounts: Arc<dyn AccountStore>,
    refresh_tokens: RefreshTokens,
    hasher: CredentialHasher,
    jwt: JwtSettings,
    store_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        refresh_store: Arc<dyn RefreshTokenStore>,
        hasher: CredentialHasher,
        jwt: JwtSettings,
        store_timeout: Duration,
    ) -> Self {
        let refresh_tokens =
            RefreshTokens::new(refresh_store, jwt.refresh_token_expiry, store_timeout);
        Self {
            accounts,
            refresh_tokens,
            hasher,
            jwt,
            store_timeout,
        }
    }

    pub fn jwt_settings(&self) -> &JwtSettings {
        &self.jwt
    }

    /// Create an account
    ///
    /// # Errors
    /// - `Validation` for a malformed email, a password out of bounds or an
    ///   overlong name
    /// - `Database(UniqueConstraintViolation)` if the email is taken
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Account, AppError> {
        let email = is_valid_email(email)?;
        is_valid_password(password)?;
        let name = display_name(name)?;

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let password_hash =
            tokio::task::spawn_blocking(move || hasher.hash_password(&password)).await??;

        let account = Account::new(email, name, password_hash);
        with_timeout(self.store_timeout, self.accounts.insert(&account)).await?;

        tracing::info!(account_id = %account.id, "Account registered");
        Ok(account)
    }

    /// Authenticate with email and password and start a session
    ///
    /// Unknown email and wrong password fail identically with
    /// `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AppError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(ValidationError::EmptyField("email and password".to_string()).into());
        }

        let account = with_timeout(self.store_timeout, self.accounts.find_by_email(&email))
            .await?
            .found();

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored_hash = account.as_ref().map(|a| a.password_hash.clone());
        let matches = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify_password(&password, &hash),
            None => {
                hasher.verify_decoy(&password);
                Ok(false)
            }
        })
        .await??;

        let account = match (account, matches) {
            (Some(account), true) => account,
            (None, _) => {
                tracing::info!("Login rejected: no account for email");
                return Err(AuthError::InvalidCredentials.into());
            }
            (Some(account), false) => {
                tracing::info!(account_id = %account.id, "Login rejected: password mismatch");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let access_token = generate_access_token(account.id, &account.email, &self.jwt)?;
        let refresh_token = self.refresh_tokens.mint(account.id).await?;

        tracing::info!(account_id = %account.id, "Login succeeded");
        Ok(IssuedSession {
            account_id: account.id,
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new access/refresh pair
    ///
    /// The presented token is accepted at most once. Unknown, expired and
    /// revoked tokens all fail with `Unauthorized`; dead records found on the
    /// way are deleted.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedSession, AppError> {
        if presented.is_empty() {
            return Err(AuthError::Unauthorized.into());
        }

        let record = match self.refresh_tokens.lookup(presented).await? {
            Lookup::Found(record) => record,
            Lookup::NotFound => {
                tracing::warn!("Refresh rejected: unknown token");
                return Err(AuthError::Unauthorized.into());
            }
        };

        if !record.is_usable(chrono::Utc::now()) {
            tracing::warn!(
                account_id = %record.account_id,
                revoked = record.revoked,
                "Refresh rejected: token expired or revoked"
            );
            if let Err(e) = self.refresh_tokens.delete_record(&record).await {
                tracing::warn!(error = %e, "Failed to delete dead refresh token");
            }
            return Err(AuthError::Unauthorized.into());
        }

        let account = match with_timeout(
            self.store_timeout,
            self.accounts.find_by_id(record.account_id),
        )
        .await?
        {
            Lookup::Found(account) => account,
            Lookup::NotFound => {
                tracing::warn!(account_id = %record.account_id, "Refresh rejected: account missing");
                if let Err(e) = self.refresh_tokens.delete_record(&record).await {
                    tracing::warn!(error = %e, "Failed to delete orphaned refresh token");
                }
                return Err(AuthError::Unauthorized.into());
            }
        };

        let access_token = generate_access_token(account.id, &account.email, &self.jwt)?;

        // New token first; losing the old delete only leaves an extra token.
        let refresh_token = self.refresh_tokens.mint(account.id).await?;

        match self.refresh_tokens.delete_record(&record).await {
            Ok(true) => {}
            Ok(false) => {
                // A concurrent rotation consumed the presented token first.
                tracing::warn!(account_id = %account.id, "Refresh rejected: token already rotated");
                if let Err(e) = self.refresh_tokens.consume(&refresh_token.secret).await {
                    tracing::warn!(error = %e, "Failed to discard refresh token minted by losing rotation");
                }
                return Err(AuthError::Unauthorized.into());
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account.id,
                    error = %e,
                    "Failed to delete rotated refresh token"
                );
            }
        }

        tracing::info!(account_id = %account.id, "Refresh token rotated");
        Ok(IssuedSession {
            account_id: account.id,
            access_token,
            refresh_token,
        })
    }

    /// End a session. Always succeeds; failures are only logged.
    pub async fn logout(&self, presented: Option<&str>) {
        let Some(secret) = presented.filter(|s| !s.is_empty()) else {
            return;
        };

        match self.refresh_tokens.consume(secret).await {
            Ok(true) => tracing::info!("Refresh token deleted at logout"),
            Ok(false) => tracing::debug!("Logout with unknown refresh token"),
            Err(e) => tracing::warn!(error = %e, "Failed to delete refresh token at logout"),
        }
    }

    /// Delete every refresh token of an account, ending all its sessions
    pub async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<u64, AppError> {
        Ok(self.refresh_tokens.revoke_all(account_id).await?)
    }

    /// Delete expired and revoked refresh tokens
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        Ok(self.refresh_tokens.purge_expired().await?)
    }

    /// Load an account by id
    pub async fn account(&self, account_id: Uuid) -> Result<Lookup<Account>, AppError> {
        Ok(with_timeout(self.store_timeout, self.accounts.find_by_id(account_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::validate_access_token;
    use crate::auth::refresh_token::hash_token;
    use crate::error::DatabaseError;
    use crate::store::{InMemoryAccountStore, InMemoryRefreshTokenStore, StoreError};
    use crate::models::RefreshTokenRecord;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        sessions: SessionManager,
        refresh_store: InMemoryRefreshTokenStore,
    }

    fn jwt() -> JwtSettings {
        JwtSettings {
            secret: "session-test-secret-at-least-32-chars".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "taskbox".to_string(),
        }
    }

    fn harness() -> Harness {
        let refresh_store = InMemoryRefreshTokenStore::new();
        let sessions = SessionManager::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(refresh_store.clone()),
            CredentialHasher::new(4).unwrap(),
            jwt(),
            Duration::from_secs(5),
        );
        Harness {
            sessions,
            refresh_store,
        }
    }

    /// Refresh store whose inserts or deletes can be made to fail
    #[derive(Clone, Default)]
    struct FlakyRefreshStore {
        inner: InMemoryRefreshTokenStore,
        fail_insert: Arc<AtomicBool>,
        fail_delete: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RefreshTokenStore for FlakyRefreshStore {
        async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("insert refused".to_string()));
            }
            self.inner.insert(record).await
        }

        async fn find_by_hash(
            &self,
            token_hash: &str,
        ) -> Result<Lookup<RefreshTokenRecord>, StoreError> {
            self.inner.find_by_hash(token_hash).await
        }

        async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("delete refused".to_string()));
            }
            self.inner.delete_by_hash(token_hash).await
        }

        async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
            self.inner.delete_for_account(account_id).await
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.delete_expired(now).await
        }
    }

    async fn flaky_session() -> (SessionManager, FlakyRefreshStore, IssuedSession) {
        let store = FlakyRefreshStore::default();
        let sessions = SessionManager::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(store.clone()),
            CredentialHasher::new(4).unwrap(),
            jwt(),
            Duration::from_secs(5),
        );
        sessions
            .register("a@example.com", "password123", None)
            .await
            .unwrap();
        let session = sessions.login("a@example.com", "password123").await.unwrap();
        (sessions, store, session)
    }

    async fn registered() -> (Harness, Account) {
        let h = harness();
        let account = h
            .sessions
            .register("a@example.com", "password123", None)
            .await
            .unwrap();
        (h, account)
    }

    fn assert_auth_error(result: Result<IssuedSession, AppError>, expected: AuthError) {
        match result {
            Err(AppError::Auth(e)) => assert_eq!(e, expected),
            other => panic!("expected {:?}, got {:?}", expected, other.map(|s| s.account_id)),
        }
    }

    #[tokio::test]
    async fn test_register_normalizes_email() {
        let h = harness();
        let account = h
            .sessions
            .register("  A@Example.COM ", "password123", Some(" Ada "))
            .await
            .unwrap();

        assert_eq!(account.email, "a@example.com");
        assert_eq!(account.name.as_deref(), Some("Ada"));
        assert_ne!(account.password_hash, "password123");
    }

    #[tokio::test]
    async fn test_register_duplicate_email_case_insensitive() {
        let (h, _) = registered().await;

        let result = h.sessions.register("A@EXAMPLE.com", "password456", None).await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let h = harness();
        let result = h.sessions.register("a@example.com", "short", None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_token_carries_account_id() {
        let (h, account) = registered().await;

        let session = h.sessions.login("A@example.com ", "password123").await.unwrap();
        let claims = validate_access_token(&session.access_token.token, &jwt()).unwrap();

        assert_eq!(session.account_id, account.id);
        assert_eq!(claims.account_id(), Ok(account.id));
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert_eq!(h.refresh_store.records_for(account.id).len(), 1);
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let (h, _) = registered().await;

        assert_auth_error(
            h.sessions.login("a@example.com", "wrong-password").await,
            AuthError::InvalidCredentials,
        );
        assert_auth_error(
            h.sessions.login("nobody@example.com", "password123").await,
            AuthError::InvalidCredentials,
        );
        assert!(h.refresh_store.is_empty());
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let (h, _) = registered().await;
        let result = h.sessions.login("   ", "password123").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let (h, account) = registered().await;
        let first = h.sessions.login("a@example.com", "password123").await.unwrap();

        let second = h.sessions.refresh(&first.refresh_token.secret).await.unwrap();

        assert_eq!(second.account_id, account.id);
        assert_ne!(second.refresh_token.secret, first.refresh_token.secret);
        let records = h.refresh_store.records_for(account.id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_hash, hash_token(&second.refresh_token.secret));
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let (h, _) = registered().await;
        let session = h.sessions.login("a@example.com", "password123").await.unwrap();

        h.sessions.refresh(&session.refresh_token.secret).await.unwrap();
        assert_auth_error(
            h.sessions.refresh(&session.refresh_token.secret).await,
            AuthError::Unauthorized,
        );
    }

    #[tokio::test]
    async fn test_refresh_unknown_token() {
        let h = harness();
        assert_auth_error(h.sessions.refresh("garbage").await, AuthError::Unauthorized);
        assert_auth_error(h.sessions.refresh("").await, AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_removed() {
        let (h, account) = registered().await;
        let session = h.sessions.login("a@example.com", "password123").await.unwrap();
        h.refresh_store
            .update_all(|r| r.expires_at = Utc::now() - chrono::Duration::seconds(1));

        assert_auth_error(
            h.sessions.refresh(&session.refresh_token.secret).await,
            AuthError::Unauthorized,
        );
        assert!(h.refresh_store.records_for(account.id).is_empty());
    }

    #[tokio::test]
    async fn test_revoked_token_rejected_and_removed() {
        let (h, account) = registered().await;
        let session = h.sessions.login("a@example.com", "password123").await.unwrap();
        h.refresh_store.update_all(|r| r.revoked = true);

        assert_auth_error(
            h.sessions.refresh(&session.refresh_token.secret).await,
            AuthError::Unauthorized,
        );
        assert!(h.refresh_store.records_for(account.id).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let (h, account) = registered().await;
        let session = h.sessions.login("a@example.com", "password123").await.unwrap();
        let secret = session.refresh_token.secret.clone();

        let (a, b) = tokio::join!(h.sessions.refresh(&secret), h.sessions.refresh(&secret));

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let winner = a.or(b).unwrap();
        let records = h.refresh_store.records_for(account.id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_hash, hash_token(&winner.refresh_token.secret));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (h, account) = registered().await;
        let session = h.sessions.login("a@example.com", "password123").await.unwrap();

        h.sessions.logout(Some(&session.refresh_token.secret)).await;
        h.sessions.logout(Some(&session.refresh_token.secret)).await;
        h.sessions.logout(Some("garbage")).await;
        h.sessions.logout(None).await;

        assert!(h.refresh_store.records_for(account.id).is_empty());
        assert_auth_error(
            h.sessions.refresh(&session.refresh_token.secret).await,
            AuthError::Unauthorized,
        );
    }

    #[tokio::test]
    async fn test_revoke_all_ends_every_session() {
        let (h, account) = registered().await;
        let first = h.sessions.login("a@example.com", "password123").await.unwrap();
        let second = h.sessions.login("a@example.com", "password123").await.unwrap();

        assert_eq!(h.sessions.revoke_all_for_account(account.id).await.unwrap(), 2);
        assert_auth_error(
            h.sessions.refresh(&first.refresh_token.secret).await,
            AuthError::Unauthorized,
        );
        assert_auth_error(
            h.sessions.refresh(&second.refresh_token.secret).await,
            AuthError::Unauthorized,
        );
    }

    #[tokio::test]
    async fn test_missing_secret_fails_closed() {
        let refresh_store = InMemoryRefreshTokenStore::new();
        let mut settings = jwt();
        settings.secret = String::new();
        let sessions = SessionManager::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(refresh_store.clone()),
            CredentialHasher::new(4).unwrap(),
            settings,
            Duration::from_secs(5),
        );
        sessions.register("a@example.com", "password123", None).await.unwrap();

        let result = sessions.login("a@example.com", "password123").await;
        assert!(matches!(result, Err(AppError::Config(_))));
        assert!(refresh_store.is_empty());
    }

    #[tokio::test]
    async fn test_rotation_succeeds_when_old_token_delete_fails() {
        let (sessions, store, first) = flaky_session().await;

        store.fail_delete.store(true, Ordering::SeqCst);
        let second = sessions.refresh(&first.refresh_token.secret).await.unwrap();
        store.fail_delete.store(false, Ordering::SeqCst);

        // The old record outlives the rotation; both secrets are stored
        let records = store.inner.records_for(first.account_id);
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .any(|r| r.token_hash == hash_token(&second.refresh_token.secret)));
        sessions.refresh(&second.refresh_token.secret).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_mint_keeps_presented_token_valid() {
        let (sessions, store, first) = flaky_session().await;

        store.fail_insert.store(true, Ordering::SeqCst);
        let result = sessions.refresh(&first.refresh_token.secret).await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(store.inner.records_for(first.account_id).len(), 1);

        store.fail_insert.store(false, Ordering::SeqCst);
        let rotated = sessions.refresh(&first.refresh_token.secret).await.unwrap();
        assert_ne!(rotated.refresh_token.secret, first.refresh_token.secret);
    }

    #[tokio::test]
    async fn test_password_past_bcrypt_limit_cannot_log_in() {
        let h = harness();
        let prefix = "a".repeat(72);

        let overlong = h
            .sessions
            .register("a@example.com", &format!("{}X", prefix), None)
            .await;
        assert!(matches!(overlong, Err(AppError::Validation(_))));

        h.sessions
            .register("a@example.com", &prefix, None)
            .await
            .unwrap();
        assert_auth_error(
            h.sessions.login("a@example.com", &format!("{}Y", prefix)).await,
            AuthError::InvalidCredentials,
        );
        assert!(h.sessions.login("a@example.com", &prefix).await.is_ok());
    }
}
