mod auth;
mod health_check;
mod projects;
mod tasks;

pub use auth::{
    get_current_account, login, logout, refresh, register, AccountResponse, TokenResponse,
    REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH,
};
pub use health_check::health_check;
pub use projects::{
    create_project, delete_project, get_project, list_project_tasks, list_projects,
    update_project, DataResponse, PageResponse,
};
pub use tasks::{create_task, delete_task, get_task, list_tasks, update_task};
