/// Postgres-backed stores
///
/// Uniqueness of `accounts.email`, `refresh_tokens.token_hash` and
/// per-account project names is enforced by unique indexes (see
/// `migrations/`); violations surface as `StoreError::Duplicate`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AccountStore, Lookup, PlannerStore, RefreshTokenStore, StoreError};
use crate::models::{Account, Project, ProjectSummary, RefreshTokenRecord, Task};
use crate::planner::{PageRequest, TaskQuery};

const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_error(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate(what.to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        _ => StoreError::Backend(err.to_string()),
    }
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Lookup<Account>, StoreError> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, name, password_hash, created_at FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map(Lookup::from)
        .map_err(|e| map_sqlx_error(e, "email"))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Lookup<Account>, StoreError> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, name, password_hash, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map(Lookup::from)
        .map_err(|e| map_sqlx_error(e, "account id"))
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, name, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "email"))?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, account_id, token_hash, created_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "token hash"))?;

        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Lookup<RefreshTokenRecord>, StoreError> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, account_id, token_hash, created_at, expires_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map(Lookup::from)
        .map_err(|e| map_sqlx_error(e, "token hash"))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "token hash"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "account id"))?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1 OR revoked = true")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "expired tokens"))?;

        Ok(result.rows_affected())
    }
}

const TASK_COLUMNS: &str = "id, account_id, project_id, title, description, due_date, \
     priority, completed, created_at, updated_at";

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Owner scope and filters shared by the task count and page queries
fn push_task_filters(builder: &mut QueryBuilder<'_, Postgres>, owner: Uuid, query: &TaskQuery) {
    builder.push(" WHERE account_id = ").push_bind(owner);
    if let Some(completed) = query.completed {
        builder.push(" AND completed = ").push_bind(completed);
    }
    if let Some(project_id) = query.project_id {
        builder.push(" AND project_id = ").push_bind(project_id);
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[derive(Clone)]
pub struct PgPlannerStore {
    pool: PgPool,
}

impl PgPlannerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlannerStore for PgPlannerStore {
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, account_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(project.id)
        .bind(project.account_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "project name"))?;

        Ok(())
    }

    async fn find_project(&self, owner: Uuid, id: Uuid) -> Result<Lookup<Project>, StoreError> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, account_id, name, description, created_at, updated_at
            FROM projects
            WHERE id = $1 AND account_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map(Lookup::from)
        .map_err(|e| map_sqlx_error(e, "project"))
    }

    async fn list_projects(
        &self,
        owner: Uuid,
        page: &PageRequest,
    ) -> Result<(Vec<ProjectSummary>, u64), StoreError> {
        let projects = sqlx::query_as::<_, ProjectSummary>(
            r#"
            SELECT p.id, p.account_id, p.name, p.description, p.created_at, p.updated_at,
                   (SELECT COUNT(*) FROM tasks t
                    WHERE t.project_id = p.id AND t.completed = false) AS open_task_count
            FROM projects p
            WHERE p.account_id = $1
            ORDER BY p.created_at DESC, p.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "project"))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE account_id = $1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "project"))?;

        Ok((projects, total as u64))
    }

    async fn update_project(&self, project: &Project) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET name = $3, description = $4, updated_at = $5
            WHERE id = $1 AND account_id = $2
            "#,
        )
        .bind(project.id)
        .bind(project.account_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "project name"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_project(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "project"))?;

        sqlx::query(
            r#"
            UPDATE tasks SET project_id = NULL, updated_at = $3
            WHERE project_id = $1 AND account_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(Utc::now())
        .execute(&mut tx)
        .await
        .map_err(|e| map_sqlx_error(e, "task"))?;

        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND account_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&mut tx)
            .await
            .map_err(|e| map_sqlx_error(e, "project"))?;

        tx.commit().await.map_err(|e| map_sqlx_error(e, "project"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, account_id, project_id, title, description, due_date,
                               priority, completed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.id)
        .bind(task.account_id)
        .bind(task.project_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.priority)
        .bind(task.completed)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "task id"))?;

        Ok(())
    }

    async fn find_task(&self, owner: Uuid, id: Uuid) -> Result<Lookup<Task>, StoreError> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1 AND account_id = $2",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map(Lookup::from)
        .map_err(|e| map_sqlx_error(e, "task"))
    }

    async fn list_tasks(
        &self,
        owner: Uuid,
        query: &TaskQuery,
    ) -> Result<(Vec<Task>, u64), StoreError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM tasks");
        push_task_filters(&mut count, owner, query);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "task"))?;

        let mut select = QueryBuilder::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
        push_task_filters(&mut select, owner, query);
        select
            .push(" ORDER BY ")
            .push(query.sort.field.column())
            .push(if query.sort.descending { " DESC" } else { " ASC" })
            .push(" NULLS LAST, id ASC LIMIT ")
            .push_bind(query.page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);

        let tasks = select
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "task"))?;

        Ok((tasks, total as u64))
    }

    async fn update_task(&self, task: &Task) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET project_id = $3, title = $4, description = $5, due_date = $6,
                priority = $7, completed = $8, updated_at = $9
            WHERE id = $1 AND account_id = $2
            "#,
        )
        .bind(task.id)
        .bind(task.account_id)
        .bind(task.project_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.priority)
        .bind(task.completed)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "task"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND account_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "task"))?;

        Ok(result.rows_affected() > 0)
    }
}
