/// In-memory stores
///
/// Mutex-guarded maps enforcing the same uniqueness rules as the database
/// indexes. Used by tests and for running without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{AccountStore, Lookup, PlannerStore, RefreshTokenStore, StoreError};
use crate::models::{Account, Project, ProjectSummary, RefreshTokenRecord, Task};
use crate::planner::{PageRequest, TaskQuery};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<Mutex<HashMap<Uuid, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Lookup<Account>, StoreError> {
        let accounts = lock(&self.accounts)?;
        Ok(accounts.values().find(|a| a.email == email).cloned().into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Lookup<Account>, StoreError> {
        let accounts = lock(&self.accounts)?;
        Ok(accounts.get(&id).cloned().into())
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = lock(&self.accounts)?;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Duplicate("email".to_string()));
        }
        if accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate("account id".to_string()));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }
}

/// Refresh token records keyed by token hash
#[derive(Clone, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Arc<Mutex<HashMap<String, RefreshTokenRecord>>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records belonging to one account
    pub fn records_for(&self, account_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.records
            .lock()
            .map(|r| {
                r.values()
                    .filter(|rec| rec.account_id == account_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rewrite stored records in place, e.g. to age them in tests
    pub fn update_all<F>(&self, mut f: F)
    where
        F: FnMut(&mut RefreshTokenRecord),
    {
        if let Ok(mut records) = self.records.lock() {
            records.values_mut().for_each(|rec| f(rec));
        }
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&record.token_hash) {
            return Err(StoreError::Duplicate("token hash".to_string()));
        }
        records.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Lookup<RefreshTokenRecord>, StoreError> {
        let records = lock(&self.records)?;
        Ok(records.get(token_hash).cloned().into())
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut records = lock(&self.records)?;
        Ok(records.remove(token_hash).is_some())
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|_, rec| rec.account_id != account_id);
        Ok((before - records.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|_, rec| rec.is_usable(now));
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
struct PlannerState {
    projects: HashMap<Uuid, Project>,
    tasks: HashMap<Uuid, Task>,
}

impl PlannerState {
    fn name_taken(&self, project: &Project) -> bool {
        let name = project.name.to_lowercase();
        self.projects.values().any(|p| {
            p.account_id == project.account_id && p.id != project.id && p.name.to_lowercase() == name
        })
    }
}

fn page_of<T>(items: Vec<T>, page: &PageRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

/// Projects and tasks in one map pair, so project deletes can detach tasks
/// under the same lock
#[derive(Clone, Default)]
pub struct InMemoryPlannerStore {
    state: Arc<Mutex<PlannerState>>,
}

impl InMemoryPlannerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlannerStore for InMemoryPlannerStore {
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        let mut state = lock(&self.state)?;
        if state.name_taken(project) {
            return Err(StoreError::Duplicate("project name".to_string()));
        }
        state.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn find_project(&self, owner: Uuid, id: Uuid) -> Result<Lookup<Project>, StoreError> {
        let state = lock(&self.state)?;
        Ok(state
            .projects
            .get(&id)
            .filter(|p| p.account_id == owner)
            .cloned()
            .into())
    }

    async fn list_projects(
        &self,
        owner: Uuid,
        page: &PageRequest,
    ) -> Result<(Vec<ProjectSummary>, u64), StoreError> {
        let state = lock(&self.state)?;
        let mut projects: Vec<&Project> = state
            .projects
            .values()
            .filter(|p| p.account_id == owner)
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let total = projects.len() as u64;

        let summaries = projects
            .into_iter()
            .map(|project| ProjectSummary {
                open_task_count: state
                    .tasks
                    .values()
                    .filter(|t| t.project_id == Some(project.id) && !t.completed)
                    .count() as i64,
                project: project.clone(),
            })
            .collect();
        Ok((page_of(summaries, page), total))
    }

    async fn update_project(&self, project: &Project) -> Result<bool, StoreError> {
        let mut state = lock(&self.state)?;
        let owned = state
            .projects
            .get(&project.id)
            .map_or(false, |p| p.account_id == project.account_id);
        if !owned {
            return Ok(false);
        }
        if state.name_taken(project) {
            return Err(StoreError::Duplicate("project name".to_string()));
        }
        state.projects.insert(project.id, project.clone());
        Ok(true)
    }

    async fn delete_project(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut state = lock(&self.state)?;
        let owned = state.projects.get(&id).map_or(false, |p| p.account_id == owner);
        if !owned {
            return Ok(false);
        }
        state.projects.remove(&id);
        let now = Utc::now();
        for task in state.tasks.values_mut().filter(|t| t.project_id == Some(id)) {
            task.project_id = None;
            task.updated_at = now;
        }
        Ok(true)
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = lock(&self.state)?;
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate("task id".to_string()));
        }
        state.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_task(&self, owner: Uuid, id: Uuid) -> Result<Lookup<Task>, StoreError> {
        let state = lock(&self.state)?;
        Ok(state
            .tasks
            .get(&id)
            .filter(|t| t.account_id == owner)
            .cloned()
            .into())
    }

    async fn list_tasks(
        &self,
        owner: Uuid,
        query: &TaskQuery,
    ) -> Result<(Vec<Task>, u64), StoreError> {
        let state = lock(&self.state)?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.account_id == owner && query.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| query.sort.compare(a, b));
        let total = tasks.len() as u64;
        Ok((page_of(tasks, &query.page), total))
    }

    async fn update_task(&self, task: &Task) -> Result<bool, StoreError> {
        let mut state = lock(&self.state)?;
        match state.tasks.get_mut(&task.id) {
            Some(stored) if stored.account_id == task.account_id => {
                *stored = task.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut state = lock(&self.state)?;
        let owned = state.tasks.get(&id).map_or(false, |t| t.account_id == owner);
        if owned {
            state.tasks.remove(&id);
        }
        Ok(owned)
    }
}
