use std::sync::Arc;

use tracing::info;

use crate::config::DatabaseConfig;
use crate::repository::{ItemRepository, MemoryStore, RepositoryError, SqliteStore, TodoRepository};
use crate::service::TodoService;

/// Handles shared by every handler, injected through axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub todos: Arc<dyn TodoRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub service: TodoService,
}

impl AppState {
    pub fn new(todos: Arc<dyn TodoRepository>, items: Arc<dyn ItemRepository>) -> Self {
        let service = TodoService::new(todos.clone(), items.clone());
        Self {
            todos,
            items,
            service,
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store)
    }

    pub async fn connect(database: &DatabaseConfig) -> Result<Self, RepositoryError> {
        match database {
            DatabaseConfig::Memory => {
                info!("using in-memory store");
                Ok(Self::in_memory())
            }
            DatabaseConfig::Sqlite(url) => {
                let store = Arc::new(SqliteStore::connect(url).await?);
                Ok(Self::new(store.clone(), store))
            }
        }
    }
}
