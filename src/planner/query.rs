/// Listing parameters: pagination, task filters and sort order
///
/// Query strings are parsed into `*Params` by actix and then checked into
/// the typed `PageRequest` / `TaskQuery` the stores consume.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::Task;

pub const DEFAULT_PROJECT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_TASK_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_SEARCH_LENGTH: usize = 100;

/// One page of a listing, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Missing or zero values fall back to page 1 and `default_size`;
    /// sizes above `MAX_PAGE_SIZE` are capped.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            page_size: page_size
                .filter(|s| *s > 0)
                .unwrap_or(default_size)
                .min(MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// Page parameters as they arrive in the query string
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn into_request(self, default_size: u32) -> PageRequest {
        PageRequest::new(self.page, self.page_size, default_size)
    }
}

/// A page of results plus the size of the whole result set
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn meta(&self) -> PageMeta {
        let size = u64::from(self.request.page_size);
        PageMeta {
            page: self.request.page,
            page_size: self.request.page_size,
            total: self.total,
            total_pages: (self.total + size - 1) / size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSortField {
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
    Title,
}

impl TaskSortField {
    /// SQL expression to order by
    pub fn column(&self) -> &'static str {
        match self {
            TaskSortField::CreatedAt => "created_at",
            TaskSortField::UpdatedAt => "updated_at",
            TaskSortField::DueDate => "due_date",
            TaskSortField::Priority => "priority",
            TaskSortField::Title => "lower(title)",
        }
    }
}

/// Sort order written `field` (ascending) or `-field` (descending).
///
/// Tasks without a due date sort last in both directions; ties fall back
/// to the task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSort {
    pub field: TaskSortField,
    pub descending: bool,
}

impl Default for TaskSort {
    fn default() -> Self {
        Self {
            field: TaskSortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for TaskSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.trim().strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, s.trim()),
        };
        let field = match name {
            "created_at" => TaskSortField::CreatedAt,
            "updated_at" => TaskSortField::UpdatedAt,
            "due_date" => TaskSortField::DueDate,
            "priority" => TaskSortField::Priority,
            "title" => TaskSortField::Title,
            _ => return Err(ValidationError::InvalidFormat("sort_by".to_string())),
        };
        Ok(Self { field, descending })
    }
}

impl TaskSort {
    /// Ordering of two tasks under this sort, matching the SQL `ORDER BY`
    pub fn compare(&self, a: &Task, b: &Task) -> Ordering {
        let primary = match self.field {
            TaskSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            TaskSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            TaskSortField::Priority => a.priority.cmp(&b.priority),
            TaskSortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            TaskSortField::DueDate => match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        let primary = if self.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Filters, sort and page for a task listing. Always scoped to one owner
/// by the store call that receives it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
    pub page: PageRequest,
    pub completed: Option<bool>,
    /// Case-insensitive substring of title or description
    pub search: Option<String>,
    pub project_id: Option<Uuid>,
    pub sort: TaskSort,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            page: PageRequest::new(None, None, DEFAULT_TASK_PAGE_SIZE),
            completed: None,
            search: None,
            project_id: None,
            sort: TaskSort::default(),
        }
    }
}

impl TaskQuery {
    /// In-process version of the store's `WHERE` clause, minus the owner
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(completed) = self.completed {
            if task.completed != completed {
                return false;
            }
        }
        if let Some(project_id) = self.project_id {
            if task.project_id != Some(project_id) {
                return false;
            }
        }
        match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task.description.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

/// Task listing parameters as they arrive in the query string
#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub completed: Option<bool>,
    pub search: Option<String>,
    pub project_id: Option<Uuid>,
    pub sort_by: Option<String>,
}

impl TaskListParams {
    pub fn into_query(self) -> Result<TaskQuery, ValidationError> {
        let search = match self.search.as_deref().map(str::trim) {
            Some(s) if s.chars().count() > MAX_SEARCH_LENGTH => {
                return Err(ValidationError::TooLong("search".to_string(), MAX_SEARCH_LENGTH));
            }
            Some(s) if !s.is_empty() => Some(s.to_string()),
            _ => None,
        };
        let sort = match self.sort_by.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => s.parse()?,
            None => TaskSort::default(),
        };

        Ok(TaskQuery {
            page: PageRequest::new(self.page, self.page_size, DEFAULT_TASK_PAGE_SIZE),
            completed: self.completed,
            search,
            project_id: self.project_id,
            sort,
        })
    }
}
