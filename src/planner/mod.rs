//! Owner-scoped projects and tasks: input checks, listings and the service
//! the routes call into.

mod query;
mod service;

pub use query::{
    Page, PageMeta, PageParams, PageRequest, TaskListParams, TaskQuery, TaskSort, TaskSortField,
    DEFAULT_PROJECT_PAGE_SIZE, DEFAULT_TASK_PAGE_SIZE, MAX_PAGE_SIZE, MAX_SEARCH_LENGTH,
};
pub use service::{NewProject, NewTask, Planner, ProjectChanges, TaskChanges};
