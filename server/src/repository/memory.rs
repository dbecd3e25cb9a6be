use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use todo_core::{Filter, Item, Model, NewItem, NewTodo, Todo, TodoPatch, Where};

use super::{ItemRepository, RepositoryError, Result, TodoRepository};

/// Both tables behind one lock, keyed by id so iteration is in id order.
#[derive(Default)]
struct Tables {
    todos: BTreeMap<i64, Todo>,
    items: BTreeMap<i64, Item>,
    last_todo_id: i64,
    last_item_id: i64,
}

/// In-process store. Every repository call holds the lock for its whole
/// duration, so each call is atomic but a sequence of calls is not.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Pick the id for a new row. Explicit ids must be free; generated ids
/// continue from the highest id ever handed out.
fn allocate<V>(rows: &BTreeMap<i64, V>, last: &mut i64, requested: Option<i64>, model: &str) -> Result<i64> {
    let id = match requested {
        Some(id) if rows.contains_key(&id) => {
            return Err(RepositoryError::Conflict(format!(
                "Duplicate entry for {model}.id: {id}"
            )))
        }
        Some(id) => id,
        None => last.checked_add(1).ok_or_else(|| {
            RepositoryError::Conflict(format!("No {model} id left after {last}"))
        })?,
    };
    *last = (*last).max(id);
    Ok(id)
}

fn row_value<T: Serialize>(row: &T) -> serde_json::Value {
    serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
}

fn selects<T: Serialize>(r#where: Option<&Where>, row: &T) -> bool {
    r#where.map_or(true, |w| w.matches(&row_value(row)))
}

fn validate<M: Model>(r#where: Option<&Where>) -> Result<()> {
    if let Some(w) = r#where {
        w.validate::<M>()?;
    }
    Ok(())
}

#[async_trait]
impl TodoRepository for MemoryStore {
    async fn create(&self, todo: NewTodo) -> Result<Todo> {
        let mut tables = self.tables.write().await;
        let Tables {
            todos, last_todo_id, ..
        } = &mut *tables;
        let id = allocate(&*todos, last_todo_id, todo.id, Todo::NAME)?;
        let todo = todo.into_todo(id);
        todos.insert(id, todo.clone());
        Ok(todo)
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Todo>> {
        filter.validate::<Todo>()?;
        let tables = self.tables.read().await;

        let mut rows: Vec<(serde_json::Value, &Todo)> = tables
            .todos
            .values()
            .map(|t| (row_value(t), t))
            .filter(|(v, _)| filter.r#where.as_ref().map_or(true, |w| w.matches(v)))
            .collect();
        if let Some(order) = &filter.order {
            // Stable sort keeps id order between equal keys.
            rows.sort_by(|(a, _), (b, _)| order.compare(a, b));
        }

        let skip = filter.start().unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Todo> {
        self.tables
            .read()
            .await
            .todos
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound {
                model: Todo::NAME,
                id,
            })
    }

    async fn count(&self, r#where: Option<&Where>) -> Result<u64> {
        validate::<Todo>(r#where)?;
        let tables = self.tables.read().await;
        Ok(tables.todos.values().filter(|t| selects(r#where, *t)).count() as u64)
    }

    async fn update_all(&self, patch: &TodoPatch, r#where: Option<&Where>) -> Result<u64> {
        validate::<Todo>(r#where)?;
        let mut tables = self.tables.write().await;
        let mut count = 0;
        for todo in tables.todos.values_mut() {
            if selects(r#where, &*todo) {
                patch.apply(todo);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_by_id(&self, id: i64, patch: &TodoPatch) -> Result<()> {
        let mut tables = self.tables.write().await;
        let todo = tables.todos.get_mut(&id).ok_or(RepositoryError::NotFound {
            model: Todo::NAME,
            id,
        })?;
        patch.apply(todo);
        Ok(())
    }

    async fn replace_by_id(&self, id: i64, todo: NewTodo) -> Result<()> {
        let mut tables = self.tables.write().await;
        let slot = tables.todos.get_mut(&id).ok_or(RepositoryError::NotFound {
            model: Todo::NAME,
            id,
        })?;
        *slot = todo.into_todo(id);
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<()> {
        self.tables
            .write()
            .await
            .todos
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound {
                model: Todo::NAME,
                id,
            })
    }
}

#[async_trait]
impl ItemRepository for MemoryStore {
    async fn create(&self, item: NewItem) -> Result<Item> {
        let todo_id = item
            .todo_id
            .ok_or_else(|| RepositoryError::Validation("Item.todoId is required".to_string()))?;
        let mut tables = self.tables.write().await;
        let Tables {
            items, last_item_id, ..
        } = &mut *tables;
        let id = allocate(&*items, last_item_id, item.id, Item::NAME)?;
        let item = Item {
            id,
            content: item.content,
            is_complete: item.is_complete,
            todo_id,
        };
        items.insert(id, item.clone());
        Ok(item)
    }

    async fn find(&self, r#where: Option<&Where>) -> Result<Vec<Item>> {
        validate::<Item>(r#where)?;
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .values()
            .filter(|i| selects(r#where, *i))
            .cloned()
            .collect())
    }

    async fn count(&self, r#where: Option<&Where>) -> Result<u64> {
        validate::<Item>(r#where)?;
        let tables = self.tables.read().await;
        Ok(tables.items.values().filter(|i| selects(r#where, *i)).count() as u64)
    }

    async fn delete_all(&self, r#where: Option<&Where>) -> Result<u64> {
        validate::<Item>(r#where)?;
        let mut tables = self.tables.write().await;
        let before = tables.items.len();
        tables.items.retain(|_, i| !selects(r#where, &*i));
        Ok((before - tables.items.len()) as u64)
    }
}
