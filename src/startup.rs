use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::SessionManager;
use crate::configuration::AuthSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::planner::Planner;
use crate::routes::{
    create_project, create_task, delete_project, delete_task, get_current_account, get_project,
    get_task, health_check, list_project_tasks, list_projects, list_tasks, login, logout,
    refresh, register, update_project, update_task,
};

pub fn run(
    listener: TcpListener,
    sessions: Arc<SessionManager>,
    planner: Arc<Planner>,
    auth_settings: AuthSettings,
) -> Result<Server, std::io::Error> {
    let jwt_config = sessions.jwt_settings().clone();
    let sessions = web::Data::from(sessions);
    let planner = web::Data::from(planner);
    let auth_settings = web::Data::new(auth_settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(sessions.clone())
            .app_data(planner.clone())
            .app_data(auth_settings.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                tracing::debug!(error = %err, "Rejected request body");
                AppError::Validation(ValidationError::InvalidFormat("request body".to_string()))
                    .into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                tracing::debug!(error = %err, "Rejected path parameter");
                AppError::Validation(ValidationError::InvalidFormat("id".to_string())).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                tracing::debug!(error = %err, "Rejected query string");
                AppError::Validation(ValidationError::InvalidFormat("query".to_string())).into()
            }))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api")
                    // Public routes
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(register))
                            .route("/login", web::post().to(login))
                            .route("/refresh", web::post().to(refresh))
                            .route("/logout", web::post().to(logout)),
                    )
                    // Protected routes (require a valid access token)
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(jwt_config.clone()))
                            .route(web::get().to(get_current_account)),
                    )
                    .service(
                        web::scope("/projects")
                            .wrap(JwtMiddleware::new(jwt_config.clone()))
                            .route("", web::post().to(create_project))
                            .route("", web::get().to(list_projects))
                            .route("/{id}", web::get().to(get_project))
                            .route("/{id}", web::patch().to(update_project))
                            .route("/{id}", web::delete().to(delete_project))
                            .route("/{id}/tasks", web::get().to(list_project_tasks)),
                    )
                    .service(
                        web::scope("/tasks")
                            .wrap(JwtMiddleware::new(jwt_config.clone()))
                            .route("", web::post().to(create_task))
                            .route("", web::get().to(list_tasks))
                            .route("/{id}", web::get().to(get_task))
                            .route("/{id}", web::patch().to(update_task))
                            .route("/{id}", web::delete().to(delete_task)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Periodically delete expired and revoked refresh tokens
pub fn spawn_purge_task(sessions: Arc<SessionManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => tracing::debug!("No expired refresh tokens to purge"),
                Ok(removed) => tracing::info!(removed, "Purged expired refresh tokens"),
                Err(e) => tracing::error!(error = %e, "Failed to purge expired refresh tokens"),
            }
        }
    })
}
