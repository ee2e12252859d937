//! Integration tests for the server skeleton

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use taskbox::auth::{CredentialHasher, SessionManager};
use taskbox::configuration::{AuthSettings, JwtSettings};
use taskbox::planner::Planner;
use taskbox::startup::run;
use taskbox::store::{InMemoryAccountStore, InMemoryPlannerStore, InMemoryRefreshTokenStore};

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let sessions = SessionManager::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryRefreshTokenStore::new()),
        CredentialHasher::new(4).expect("Failed to build hasher"),
        JwtSettings {
            secret: "health-check-secret-at-least-32-chars".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "taskbox".to_string(),
        },
        Duration::from_secs(5),
    );
    let planner = Planner::new(Arc::new(InMemoryPlannerStore::new()), Duration::from_secs(5));
    let server = run(
        listener,
        Arc::new(sessions),
        Arc::new(planner),
        AuthSettings::default(),
    )
        .expect("Failed to create server");

    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/nothing-here", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}
