//! REST backend for todos and their checklist items.
//!
//! # Overview
//! - `controller`: the `/todos` routes.
//! - `service`: writes that span both repositories.
//! - `repository`: the storage seam, with in-memory and SQLite backends.
//! - `error`: maps repository and extractor failures onto HTTP responses.
//! - `config` / `state`: start-up wiring.

pub mod config;
pub mod controller;
pub mod error;
pub mod repository;
pub mod service;
pub mod state;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use config::{Config, ConfigError, DatabaseConfig};
pub use error::AppError;
pub use state::AppState;
pub use todo_core::{Count, CreateTodoRequest, Item, NewItem, NewTodo, Todo, TodoPatch, TodoStatus};

pub fn router(state: AppState) -> Router {
    controller::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router over a fresh in-memory store.
pub fn app() -> Router {
    router(AppState::in_memory())
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}
