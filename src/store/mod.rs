/// Persistence Interfaces
///
/// Account, refresh token and planner storage behind traits, so the
/// services can run against Postgres in production and in-memory maps in
/// tests. Handles are built once at startup and injected; nothing here is
/// global.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{Account, Project, ProjectSummary, RefreshTokenRecord, Task};
use crate::planner::{PageRequest, TaskQuery};

mod memory;
mod postgres;

pub use memory::{InMemoryAccountStore, InMemoryPlannerStore, InMemoryRefreshTokenStore};
pub use postgres::{PgAccountStore, PgPlannerStore, PgRefreshTokenStore};

/// Store failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    Duplicate(String),
    /// The operation exceeded its deadline
    Timeout,
    /// Any other backend failure, detail for logs only
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Duplicate(what) => write!(f, "duplicate {}", what),
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Backend(detail) => write!(f, "store error: {}", detail),
        }
    }
}

impl std::error::Error for StoreError {}

/// Outcome of a single-record lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Lookup<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Lookup<Account>, StoreError>;

    /// Fails with `StoreError::Duplicate` if the email is taken.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the hash already exists.
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Lookup<RefreshTokenRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError>;

    /// Returns the number of records removed.
    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError>;

    /// Removes records expired at `now` or flagged revoked.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Projects and tasks. Every read and write is scoped to the owning account;
/// a record owned by someone else behaves exactly like a missing one.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the owner already has a project
    /// of that name, ignoring case.
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn find_project(&self, owner: Uuid, id: Uuid) -> Result<Lookup<Project>, StoreError>;

    /// Newest first, with open task counts. Returns the page and the total.
    async fn list_projects(
        &self,
        owner: Uuid,
        page: &PageRequest,
    ) -> Result<(Vec<ProjectSummary>, u64), StoreError>;

    /// Writes name, description and `updated_at`. Returns whether the
    /// project existed for its owner.
    async fn update_project(&self, project: &Project) -> Result<bool, StoreError>;

    /// Deletes the project and detaches its tasks. Returns whether it existed.
    async fn delete_project(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn find_task(&self, owner: Uuid, id: Uuid) -> Result<Lookup<Task>, StoreError>;

    /// Filtered, sorted page of the owner's tasks and the filtered total.
    async fn list_tasks(&self, owner: Uuid, query: &TaskQuery)
        -> Result<(Vec<Task>, u64), StoreError>;

    /// Writes every mutable field. Returns whether the task existed for its
    /// owner.
    async fn update_task(&self, task: &Task) -> Result<bool, StoreError>;

    async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

/// Run a store operation under a deadline.
///
/// The operation future is dropped when the deadline passes, releasing
/// whatever it holds (pooled connection, lock guard).
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(timeout_ms = limit.as_millis() as u64, "Store operation timed out");
            Err(StoreError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_with_timeout_fails_slow_operation() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout));
    }

    #[test]
    fn test_lookup_from_option() {
        assert_eq!(Lookup::from(Some(1)), Lookup::Found(1));
        assert_eq!(Lookup::<i32>::from(None), Lookup::NotFound);
        assert_eq!(Lookup::Found("x").found(), Some("x"));
    }
}
