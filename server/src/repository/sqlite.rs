use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use todo_core::filter::{Clause, Direction, Order};
use todo_core::{
    Filter, FilterError, Item, Model, NewItem, NewTodo, Operator, Todo, TodoPatch, TodoStatus,
    Where,
};
use tracing::info;

use super::{ItemRepository, RepositoryError, Result, TodoRepository};

const TODO_COLUMNS: &str = "id, title, status, subtitle, deleted_at";
const ITEM_COLUMNS: &str = "id, content, is_complete, todo_id";

/// Maps a wire property name to its column.
type ColumnMap = fn(&str) -> Option<&'static str>;

fn todo_column(property: &str) -> Option<&'static str> {
    match property {
        "id" => Some("id"),
        "title" => Some("title"),
        "status" => Some("status"),
        "subtitle" => Some("subtitle"),
        "deletedAt" => Some("deleted_at"),
        _ => None,
    }
}

fn item_column(property: &str) -> Option<&'static str> {
    match property {
        "id" => Some("id"),
        "content" => Some("content"),
        "isComplete" => Some("is_complete"),
        "todoId" => Some("todo_id"),
        _ => None,
    }
}

#[derive(FromRow)]
struct TodoRow {
    id: i64,
    title: String,
    status: String,
    subtitle: Option<String>,
    deleted_at: bool,
}

impl TryFrom<TodoRow> for Todo {
    type Error = RepositoryError;

    fn try_from(row: TodoRow) -> Result<Self> {
        let status = row
            .status
            .parse::<TodoStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Todo {
            id: row.id,
            title: row.title,
            status,
            subtitle: row.subtitle,
            deleted_at: row.deleted_at,
            items: None,
        })
    }
}

#[derive(FromRow)]
struct ItemRow {
    id: i64,
    content: String,
    is_complete: bool,
    todo_id: i64,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            content: row.content,
            is_complete: row.is_complete,
            todo_id: row.todo_id,
        }
    }
}

/// SQLite-backed store. Schema comes from the embedded migrations.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to an in-memory database opens a new, empty one.
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        info!(url, "sqlite store ready");

        Ok(Self { pool })
    }
}

fn insert_error(err: sqlx::Error, model: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(format!("Duplicate entry for {model}.id"));
        }
    }
    RepositoryError::Database(err)
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Bool(b) => {
            qb.push_bind(*b);
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                qb.push_bind(i);
            }
            None => {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        },
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        _ => {
            qb.push("NULL");
        }
    }
}

fn comparison(op: Operator) -> Option<&'static str> {
    match op {
        Operator::Eq => Some(" = "),
        Operator::Neq => Some(" <> "),
        Operator::Gt => Some(" > "),
        Operator::Gte => Some(" >= "),
        Operator::Lt => Some(" < "),
        Operator::Lte => Some(" <= "),
        Operator::Like => Some(" LIKE "),
        Operator::Nlike => Some(" NOT LIKE "),
        Operator::Inq | Operator::Nin | Operator::Between => None,
    }
}

fn push_condition(
    qb: &mut QueryBuilder<'_, Sqlite>,
    column: &str,
    op: Operator,
    operand: &Value,
) -> std::result::Result<(), FilterError> {
    match (op, operand) {
        (Operator::Eq, Value::Null) => {
            qb.push(column).push(" IS NULL");
        }
        (Operator::Neq, Value::Null) => {
            qb.push(column).push(" IS NOT NULL");
        }
        (Operator::Inq, Value::Array(values)) if values.is_empty() => {
            qb.push("1 = 0");
        }
        (Operator::Nin, Value::Array(values)) if values.is_empty() => {
            qb.push(column).push(" IS NOT NULL");
        }
        (Operator::Inq | Operator::Nin, Value::Array(values)) => {
            qb.push(column);
            qb.push(if op == Operator::Inq { " IN (" } else { " NOT IN (" });
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push(")");
        }
        (Operator::Between, Value::Array(bounds)) if bounds.len() == 2 => {
            qb.push(column).push(" BETWEEN ");
            push_value(qb, &bounds[0]);
            qb.push(" AND ");
            push_value(qb, &bounds[1]);
        }
        (op, value) if !value.is_array() && !value.is_object() => {
            let sql = comparison(op).ok_or_else(|| {
                FilterError(format!("`{}` expects an array operand", op.as_str()))
            })?;
            qb.push(column).push(sql);
            push_value(qb, value);
        }
        (op, _) => {
            return Err(FilterError(format!(
                "invalid operand for `{}` on `{column}`",
                op.as_str()
            )))
        }
    }
    Ok(())
}

fn push_group(
    qb: &mut QueryBuilder<'_, Sqlite>,
    wheres: &[Where],
    separator: &str,
    empty: &str,
    columns: ColumnMap,
) -> std::result::Result<(), FilterError> {
    if wheres.is_empty() {
        qb.push(empty);
        return Ok(());
    }
    qb.push("(");
    for (i, w) in wheres.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        push_where(qb, Some(w), columns)?;
    }
    qb.push(")");
    Ok(())
}

/// Append `w` as a parenthesised boolean expression. No clause means `1 = 1`.
fn push_where(
    qb: &mut QueryBuilder<'_, Sqlite>,
    w: Option<&Where>,
    columns: ColumnMap,
) -> std::result::Result<(), FilterError> {
    let Some(w) = w.filter(|w| !w.is_empty()) else {
        qb.push("1 = 1");
        return Ok(());
    };

    qb.push("(");
    for (i, clause) in w.clauses().iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        match clause {
            Clause::Property { name, op, operand } => {
                let column = columns(name)
                    .ok_or_else(|| FilterError(format!("unknown property `{name}`")))?;
                push_condition(qb, column, *op, operand)?;
            }
            Clause::And(wheres) => push_group(qb, wheres, " AND ", "1 = 1", columns)?,
            Clause::Or(wheres) => push_group(qb, wheres, " OR ", "1 = 0", columns)?,
        }
    }
    qb.push(")");
    Ok(())
}

fn push_order(
    qb: &mut QueryBuilder<'_, Sqlite>,
    order: Option<&Order>,
    columns: ColumnMap,
) -> std::result::Result<(), FilterError> {
    qb.push(" ORDER BY ");
    for key in order.map(|o| o.0.as_slice()).unwrap_or_default() {
        let column = columns(&key.property)
            .ok_or_else(|| FilterError(format!("unknown property `{}`", key.property)))?;
        qb.push(column);
        qb.push(match key.direction {
            Direction::Asc => " ASC, ",
            Direction::Desc => " DESC, ",
        });
    }
    qb.push("id ASC");
    Ok(())
}

fn push_paging(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    let start = filter.start();
    if filter.limit.is_none() && start.is_none() {
        return;
    }
    // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
    let limit = filter
        .limit
        .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    qb.push(" LIMIT ").push_bind(limit);
    if let Some(skip) = start {
        qb.push(" OFFSET ")
            .push_bind(i64::try_from(skip).unwrap_or(i64::MAX));
    }
}

fn push_assignments(qb: &mut QueryBuilder<'_, Sqlite>, patch: &TodoPatch) {
    let mut set = qb.separated(", ");
    if let Some(title) = &patch.title {
        set.push("title = ").push_bind_unseparated(title.clone());
    }
    if let Some(status) = patch.status {
        set.push("status = ").push_bind_unseparated(status.as_str());
    }
    if let Some(subtitle) = &patch.subtitle {
        set.push("subtitle = ").push_bind_unseparated(subtitle.clone());
    }
    if let Some(deleted_at) = patch.deleted_at {
        set.push("deleted_at = ").push_bind_unseparated(deleted_at);
    }
}

fn not_found(model: &'static str, id: i64) -> RepositoryError {
    RepositoryError::NotFound { model, id }
}

#[async_trait]
impl TodoRepository for SqliteStore {
    async fn create(&self, todo: NewTodo) -> Result<Todo> {
        let result = sqlx::query(
            "INSERT INTO todo (id, title, status, subtitle, deleted_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(todo.id)
        .bind(&todo.title)
        .bind(todo.status.as_str())
        .bind(&todo.subtitle)
        .bind(todo.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, Todo::NAME))?;

        Ok(todo.into_todo(result.last_insert_rowid()))
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Todo>> {
        filter.validate::<Todo>()?;
        let mut qb = QueryBuilder::new(format!("SELECT {TODO_COLUMNS} FROM todo WHERE "));
        push_where(&mut qb, filter.r#where.as_ref(), todo_column)?;
        push_order(&mut qb, filter.order.as_ref(), todo_column)?;
        push_paging(&mut qb, filter);

        let rows = qb.build_query_as::<TodoRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Todo::try_from).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Todo> {
        let row = sqlx::query_as::<_, TodoRow>(&format!(
            "SELECT {TODO_COLUMNS} FROM todo WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(Todo::NAME, id))?;
        Todo::try_from(row)
    }

    async fn count(&self, r#where: Option<&Where>) -> Result<u64> {
        if let Some(w) = r#where {
            w.validate::<Todo>()?;
        }
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM todo WHERE ");
        push_where(&mut qb, r#where, todo_column)?;
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn update_all(&self, patch: &TodoPatch, r#where: Option<&Where>) -> Result<u64> {
        if patch.is_empty() {
            return TodoRepository::count(self, r#where).await;
        }
        if let Some(w) = r#where {
            w.validate::<Todo>()?;
        }
        let mut qb = QueryBuilder::new("UPDATE todo SET ");
        push_assignments(&mut qb, patch);
        qb.push(" WHERE ");
        push_where(&mut qb, r#where, todo_column)?;

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_by_id(&self, id: i64, patch: &TodoPatch) -> Result<()> {
        if patch.is_empty() {
            return self.find_by_id(id).await.map(|_| ());
        }
        let mut qb = QueryBuilder::new("UPDATE todo SET ");
        push_assignments(&mut qb, patch);
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(not_found(Todo::NAME, id));
        }
        Ok(())
    }

    async fn replace_by_id(&self, id: i64, todo: NewTodo) -> Result<()> {
        let result = sqlx::query(
            "UPDATE todo SET title = ?, status = ?, subtitle = ?, deleted_at = ? WHERE id = ?",
        )
        .bind(&todo.title)
        .bind(todo.status.as_str())
        .bind(&todo.subtitle)
        .bind(todo.deleted_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(Todo::NAME, id));
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM todo WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(Todo::NAME, id));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for SqliteStore {
    async fn create(&self, item: NewItem) -> Result<Item> {
        let todo_id = item
            .todo_id
            .ok_or_else(|| RepositoryError::Validation("Item.todoId is required".to_string()))?;
        let result = sqlx::query(
            "INSERT INTO item (id, content, is_complete, todo_id) VALUES (?, ?, ?, ?)",
        )
        .bind(item.id)
        .bind(&item.content)
        .bind(item.is_complete)
        .bind(todo_id)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, Item::NAME))?;

        Ok(Item {
            id: result.last_insert_rowid(),
            content: item.content,
            is_complete: item.is_complete,
            todo_id,
        })
    }

    async fn find(&self, r#where: Option<&Where>) -> Result<Vec<Item>> {
        if let Some(w) = r#where {
            w.validate::<Item>()?;
        }
        let mut qb = QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM item WHERE "));
        push_where(&mut qb, r#where, item_column)?;
        qb.push(" ORDER BY id ASC");

        let rows = qb.build_query_as::<ItemRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn count(&self, r#where: Option<&Where>) -> Result<u64> {
        if let Some(w) = r#where {
            w.validate::<Item>()?;
        }
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM item WHERE ");
        push_where(&mut qb, r#where, item_column)?;
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn delete_all(&self, r#where: Option<&Where>) -> Result<u64> {
        if let Some(w) = r#where {
            w.validate::<Item>()?;
        }
        let mut qb = QueryBuilder::new("DELETE FROM item WHERE ");
        push_where(&mut qb, r#where, item_column)?;

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
