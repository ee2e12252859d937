/// Project Routes
///
/// CRUD for the caller's projects plus the task listing of one project.
/// All handlers sit behind `JwtMiddleware`; the owner is always the account
/// in the access token.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthenticatedAccount;
use crate::planner::{
    NewProject, Page, PageMeta, PageParams, Planner, ProjectChanges, TaskListParams,
    DEFAULT_PROJECT_PAGE_SIZE,
};

/// `{"data": ...}` envelope for single records
#[derive(Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// `{"data": [...], "meta": {...}}` envelope for listings
#[derive(Serialize)]
pub struct PageResponse<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        let meta = page.meta();
        Self {
            data: page.items,
            meta,
        }
    }
}

/// POST /api/projects
///
/// # Errors
/// - 400: blank or overlong name, overlong description
/// - 409: the caller already has a project with that name
pub async fn create_project(
    account: web::ReqData<AuthenticatedAccount>,
    form: web::Json<NewProject>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let project = planner
        .create_project(account.account_id, form.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(DataResponse::new(project)))
}

/// GET /api/projects?page=&page_size=
pub async fn list_projects(
    account: web::ReqData<AuthenticatedAccount>,
    params: web::Query<PageParams>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let request = params.into_inner().into_request(DEFAULT_PROJECT_PAGE_SIZE);
    let page = planner.list_projects(account.account_id, request).await?;
    Ok(HttpResponse::Ok().json(PageResponse::from(page)))
}

/// GET /api/projects/{id}
pub async fn get_project(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let project = planner.project(account.account_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(project)))
}

/// PATCH /api/projects/{id}
///
/// # Errors
/// - 400: no fields given, or a field fails validation
/// - 404: no such project for the caller
/// - 409: the new name is taken
pub async fn update_project(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    form: web::Json<ProjectChanges>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let project = planner
        .update_project(account.account_id, path.into_inner(), form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(project)))
}

/// DELETE /api/projects/{id}
///
/// Tasks filed under the project survive, detached from it.
pub async fn delete_project(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    planner
        .delete_project(account.account_id, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/projects/{id}/tasks
///
/// Same filters as `GET /api/tasks`; `project_id` in the query is ignored.
pub async fn list_project_tasks(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    params: web::Query<TaskListParams>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let query = params.into_inner().into_query()?;
    let page = planner
        .project_tasks(account.account_id, path.into_inner(), query)
        .await?;
    Ok(HttpResponse::Ok().json(PageResponse::from(page)))
}
