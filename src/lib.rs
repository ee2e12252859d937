//! Account sessions and an owner-scoped task planner: registration, login,
//! token rotation, logout, and project and task CRUD.

pub mod auth;
pub mod configuration;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod planner;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod validators;
