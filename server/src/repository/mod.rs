//! Persistence seam between handlers and storage.
//!
//! Handlers and `TodoService` only see `dyn TodoRepository` and
//! `dyn ItemRepository`; which backend sits behind them is decided once at
//! start-up from `DatabaseConfig`.

mod memory;
mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use todo_core::{FilterError, Filter, Item, NewItem, NewTodo, Operator, Todo, TodoPatch, Where};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {model} with id {id}")]
    NotFound { model: &'static str, id: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    InvalidFilter(#[from] FilterError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn create(&self, todo: NewTodo) -> Result<Todo>;

    /// Rows matching `filter.where`, sorted by `filter.order` then id, paged
    /// by `skip`/`limit`. Relations are never populated here.
    async fn find(&self, filter: &Filter) -> Result<Vec<Todo>>;

    async fn find_by_id(&self, id: i64) -> Result<Todo>;

    async fn count(&self, r#where: Option<&Where>) -> Result<u64>;

    /// Apply `patch` to every row matching `where`; returns the number of rows matched.
    async fn update_all(&self, patch: &TodoPatch, r#where: Option<&Where>) -> Result<u64>;

    async fn update_by_id(&self, id: i64, patch: &TodoPatch) -> Result<()>;

    async fn replace_by_id(&self, id: i64, todo: NewTodo) -> Result<()>;

    async fn delete_by_id(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Fails with `Validation` when `todo_id` is unset.
    async fn create(&self, item: NewItem) -> Result<Item>;

    async fn find(&self, r#where: Option<&Where>) -> Result<Vec<Item>>;

    async fn count(&self, r#where: Option<&Where>) -> Result<u64>;

    /// Delete every row matching `where`; returns the number of rows removed.
    async fn delete_all(&self, r#where: Option<&Where>) -> Result<u64>;
}

/// Most todo ids bound into one item lookup. SQLite caps the number of
/// bound parameters per statement.
const IDS_PER_LOOKUP: usize = 500;

/// Populate `items` on each todo with `todoId IN (...)` lookups of at most
/// `IDS_PER_LOOKUP` ids. Todos without children get an empty list.
pub async fn include_items(items: &dyn ItemRepository, todos: &mut [Todo]) -> Result<()> {
    let mut grouped: HashMap<i64, Vec<Item>> = HashMap::new();
    for chunk in todos.chunks(IDS_PER_LOOKUP) {
        let ids: Vec<serde_json::Value> = chunk.iter().map(|t| t.id.into()).collect();
        let by_todo = Where::new().op("todoId", Operator::Inq, ids);
        for item in items.find(Some(&by_todo)).await? {
            grouped.entry(item.todo_id).or_default().push(item);
        }
    }
    for todo in todos.iter_mut() {
        todo.items = Some(grouped.remove(&todo.id).unwrap_or_default());
    }
    Ok(())
}
