use std::sync::Arc;

use todo_core::{NewItem, NewTodo, Todo};
use tracing::debug;

use crate::repository::{ItemRepository, Result, TodoRepository};

/// Operations that span both repositories.
#[derive(Clone)]
pub struct TodoService {
    todos: Arc<dyn TodoRepository>,
    items: Arc<dyn ItemRepository>,
}

impl TodoService {
    pub fn new(todos: Arc<dyn TodoRepository>, items: Arc<dyn ItemRepository>) -> Self {
        Self { todos, items }
    }

    /// Create `todo`, then each item in order with `todoId` pointing at it.
    ///
    /// The steps are independent writes: if an item fails, the todo and the
    /// items before it stay persisted and the error is returned. The result
    /// is the bare todo, without `items`.
    pub async fn create_todo_with_items(&self, todo: NewTodo, items: Vec<NewItem>) -> Result<Todo> {
        let created = self.todos.create(todo).await?;
        debug!(todo_id = created.id, items = items.len(), "created todo");

        for mut item in items {
            item.todo_id = Some(created.id);
            let item = self.items.create(item).await?;
            debug!(todo_id = created.id, item_id = item.id, "created item");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use todo_core::{TodoStatus, Where};

    use super::*;
    use crate::repository::{MemoryStore, RepositoryError};

    fn service() -> (TodoService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TodoService::new(store.clone(), store.clone()), store)
    }

    #[tokio::test]
    async fn items_point_at_the_new_todo() {
        let (service, store) = service();
        let items = vec![
            NewItem::new("milk", false),
            NewItem::new("eggs", true),
            NewItem {
                todo_id: Some(999),
                ..NewItem::new("bread", false)
            },
        ];
        let todo = service
            .create_todo_with_items(NewTodo::new("Groceries", TodoStatus::Active), items)
            .await
            .unwrap();
        assert!(todo.items.is_none());

        let children = ItemRepository::find(store.as_ref(), None).await.unwrap();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|i| i.todo_id == todo.id));
    }

    #[tokio::test]
    async fn no_items_creates_only_the_todo() {
        let (service, store) = service();
        service
            .create_todo_with_items(NewTodo::new("Solo", TodoStatus::Inactive), Vec::new())
            .await
            .unwrap();
        assert_eq!(TodoRepository::count(store.as_ref(), None).await.unwrap(), 1);
        assert_eq!(ItemRepository::count(store.as_ref(), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_item_leaves_earlier_writes_in_place() {
        let (service, store) = service();
        let duplicate = NewItem {
            id: Some(7),
            ..NewItem::new("first", false)
        };
        let items = vec![
            duplicate.clone(),
            NewItem {
                content: "second".to_string(),
                ..duplicate
            },
            NewItem::new("never written", false),
        ];
        let err = service
            .create_todo_with_items(NewTodo::new("Partial", TodoStatus::Active), items)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        assert_eq!(TodoRepository::count(store.as_ref(), None).await.unwrap(), 1);
        let by_todo = Where::new().equals("todoId", 1);
        let children = ItemRepository::find(store.as_ref(), Some(&by_todo)).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].content, "first");
    }
}
