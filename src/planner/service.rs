/// Planner Service
///
/// Creates, reads, changes and deletes an account's projects and tasks.
/// Every call takes the owner from the verified access token; ids that
/// belong to another account are reported exactly like missing ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::query::{Page, PageRequest, TaskQuery};
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::models::{Priority, Project, ProjectSummary, Task};
use crate::store::{with_timeout, Lookup, PlannerStore};
use crate::validators::{optional_text, required_text};

const MAX_PROJECT_NAME_LENGTH: usize = 100;
const MAX_PROJECT_DESCRIPTION_LENGTH: usize = 500;
const MAX_TASK_TITLE_LENGTH: usize = 200;
const MAX_TASK_DESCRIPTION_LENGTH: usize = 2000;

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field
/// (`None`, via `#[serde(default)]`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct NewProject {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial project update; absent fields stay as they are
#[derive(Debug, Default, Deserialize)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ProjectChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

/// Partial task update. `due_date` and `project_id` may be sent as `null`
/// to clear them.
#[derive(Debug, Default, Deserialize)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "present")]
    pub project_id: Option<Option<Uuid>>,
}

impl TaskChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.project_id.is_none()
    }
}

fn found<T>(lookup: Lookup<T>, what: &str) -> Result<T, AppError> {
    lookup
        .found()
        .ok_or_else(|| DatabaseError::NotFound(what.to_string()).into())
}

fn no_changes() -> AppError {
    ValidationError::EmptyField("at least one field".to_string()).into()
}

pub struct Planner {
    store: Arc<dyn PlannerStore>,
    store_timeout: Duration,
}

impl Planner {
    pub fn new(store: Arc<dyn PlannerStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// # Errors
    /// - `Validation` for a blank or overlong name or an overlong description
    /// - `Database(UniqueConstraintViolation)` if the owner already has a
    ///   project of that name
    pub async fn create_project(&self, owner: Uuid, input: NewProject) -> Result<Project, AppError> {
        let name = required_text("name", &input.name, MAX_PROJECT_NAME_LENGTH)?;
        let description = optional_text(
            "description",
            input.description.as_deref().unwrap_or_default(),
            MAX_PROJECT_DESCRIPTION_LENGTH,
        )?;

        let project = Project::new(owner, name, description);
        with_timeout(self.store_timeout, self.store.insert_project(&project)).await?;

        tracing::info!(account_id = %owner, project_id = %project.id, "Project created");
        Ok(project)
    }

    pub async fn list_projects(
        &self,
        owner: Uuid,
        request: PageRequest,
    ) -> Result<Page<ProjectSummary>, AppError> {
        let (items, total) =
            with_timeout(self.store_timeout, self.store.list_projects(owner, &request)).await?;
        Ok(Page {
            items,
            total,
            request,
        })
    }

    pub async fn project(&self, owner: Uuid, id: Uuid) -> Result<Project, AppError> {
        let lookup = with_timeout(self.store_timeout, self.store.find_project(owner, id)).await?;
        found(lookup, "project")
    }

    pub async fn update_project(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: ProjectChanges,
    ) -> Result<Project, AppError> {
        if changes.is_empty() {
            return Err(no_changes());
        }

        let mut project = self.project(owner, id).await?;
        if let Some(name) = changes.name.as_deref() {
            project.name = required_text("name", name, MAX_PROJECT_NAME_LENGTH)?;
        }
        if let Some(description) = changes.description.as_deref() {
            project.description =
                optional_text("description", description, MAX_PROJECT_DESCRIPTION_LENGTH)?;
        }
        project.updated_at = Utc::now();

        if !with_timeout(self.store_timeout, self.store.update_project(&project)).await? {
            // Deleted between the read and the write
            return Err(DatabaseError::NotFound("project".to_string()).into());
        }

        tracing::info!(account_id = %owner, project_id = %id, "Project updated");
        Ok(project)
    }

    /// Delete a project. Its tasks are kept and detached from it.
    pub async fn delete_project(&self, owner: Uuid, id: Uuid) -> Result<(), AppError> {
        if !with_timeout(self.store_timeout, self.store.delete_project(owner, id)).await? {
            return Err(DatabaseError::NotFound("project".to_string()).into());
        }
        tracing::info!(account_id = %owner, project_id = %id, "Project deleted");
        Ok(())
    }

    /// # Errors
    /// - `Validation` for a blank or overlong title or an overlong description
    /// - `Database(NotFound)` if `project_id` is not one of the owner's projects
    pub async fn create_task(&self, owner: Uuid, input: NewTask) -> Result<Task, AppError> {
        let title = required_text("title", &input.title, MAX_TASK_TITLE_LENGTH)?;
        let description = optional_text(
            "description",
            input.description.as_deref().unwrap_or_default(),
            MAX_TASK_DESCRIPTION_LENGTH,
        )?;
        if let Some(project_id) = input.project_id {
            self.project(owner, project_id).await?;
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            account_id: owner,
            project_id: input.project_id,
            title,
            description,
            due_date: input.due_date,
            priority: input.priority.unwrap_or_default(),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        with_timeout(self.store_timeout, self.store.insert_task(&task)).await?;

        tracing::info!(account_id = %owner, task_id = %task.id, "Task created");
        Ok(task)
    }

    pub async fn list_tasks(&self, owner: Uuid, query: TaskQuery) -> Result<Page<Task>, AppError> {
        let (items, total) =
            with_timeout(self.store_timeout, self.store.list_tasks(owner, &query)).await?;
        Ok(Page {
            items,
            total,
            request: query.page,
        })
    }

    /// Tasks filed under one project. A `project_id` filter already in
    /// `query` is replaced.
    pub async fn project_tasks(
        &self,
        owner: Uuid,
        project_id: Uuid,
        mut query: TaskQuery,
    ) -> Result<Page<Task>, AppError> {
        self.project(owner, project_id).await?;
        query.project_id = Some(project_id);
        self.list_tasks(owner, query).await
    }

    pub async fn task(&self, owner: Uuid, id: Uuid) -> Result<Task, AppError> {
        let lookup = with_timeout(self.store_timeout, self.store.find_task(owner, id)).await?;
        found(lookup, "task")
    }

    pub async fn update_task(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: TaskChanges,
    ) -> Result<Task, AppError> {
        if changes.is_empty() {
            return Err(no_changes());
        }

        let mut task = self.task(owner, id).await?;
        if let Some(title) = changes.title.as_deref() {
            task.title = required_text("title", title, MAX_TASK_TITLE_LENGTH)?;
        }
        if let Some(description) = changes.description.as_deref() {
            task.description =
                optional_text("description", description, MAX_TASK_DESCRIPTION_LENGTH)?;
        }
        if let Some(completed) = changes.completed {
            task.completed = completed;
        }
        if let Some(due_date) = changes.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = changes.priority {
            task.priority = priority;
        }
        if let Some(project_id) = changes.project_id {
            if let Some(project_id) = project_id {
                self.project(owner, project_id).await?;
            }
            task.project_id = project_id;
        }
        task.updated_at = Utc::now();

        if !with_timeout(self.store_timeout, self.store.update_task(&task)).await? {
            return Err(DatabaseError::NotFound("task".to_string()).into());
        }

        tracing::info!(account_id = %owner, task_id = %id, "Task updated");
        Ok(task)
    }

    pub async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<(), AppError> {
        if !with_timeout(self.store_timeout, self.store.delete_task(owner, id)).await? {
            return Err(DatabaseError::NotFound("task".to_string()).into());
        }
        tracing::info!(account_id = %owner, task_id = %id, "Task deleted");
        Ok(())
    }
}
