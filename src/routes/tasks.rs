/// Task Routes
///
/// CRUD for the caller's tasks, with filtered, sorted and paginated listing.

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use super::projects::{DataResponse, PageResponse};
use crate::error::AppError;
use crate::middleware::AuthenticatedAccount;
use crate::planner::{NewTask, Planner, TaskChanges, TaskListParams};

/// POST /api/tasks
///
/// # Errors
/// - 400: blank or overlong title, bad priority or due date
/// - 404: `project_id` is not one of the caller's projects
pub async fn create_task(
    account: web::ReqData<AuthenticatedAccount>,
    form: web::Json<NewTask>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let task = planner.create_task(account.account_id, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(DataResponse::new(task)))
}

/// GET /api/tasks?page=&page_size=&completed=&search=&project_id=&sort_by=
///
/// `sort_by` is one of `created_at`, `updated_at`, `due_date`, `priority`,
/// `title`, with a leading `-` for descending. Default `-created_at`.
pub async fn list_tasks(
    account: web::ReqData<AuthenticatedAccount>,
    params: web::Query<TaskListParams>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let query = params.into_inner().into_query()?;
    let page = planner.list_tasks(account.account_id, query).await?;
    Ok(HttpResponse::Ok().json(PageResponse::from(page)))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let task = planner.task(account.account_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(task)))
}

/// PATCH /api/tasks/{id}
///
/// Send `"due_date": null` or `"project_id": null` to clear either field.
pub async fn update_task(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    form: web::Json<TaskChanges>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    let task = planner
        .update_task(account.account_id, path.into_inner(), form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(task)))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    account: web::ReqData<AuthenticatedAccount>,
    path: web::Path<Uuid>,
    planner: web::Data<Planner>,
) -> Result<HttpResponse, AppError> {
    planner.delete_task(account.account_id, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
