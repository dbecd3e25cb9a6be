//! Routes under `/todos`.
//!
//! `filter` and `where` query parameters carry JSON strings. Extractor
//! rejections are taken as `Result` and converted into `AppError` so every
//! failure renders the same error envelope.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use todo_core::{
    Count, CreateTodoRequest, Fields, Filter, FilterError, NewTodo, Todo, TodoPatch, Where,
};
use tracing::debug;

use crate::error::AppError;
use crate::repository::include_items;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(find).post(create).patch(update_all))
        .route("/todos/count", get(count))
        .route(
            "/todos/{id}",
            get(find_by_id)
                .patch(update_by_id)
                .put(replace_by_id)
                .delete(delete_by_id),
        )
}

#[derive(Debug, Default, Deserialize)]
struct FindQuery {
    filter: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhereQuery {
    #[serde(rename = "where")]
    r#where: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    filter: Option<String>,
}

fn json_param<T: DeserializeOwned>(name: &str, raw: Option<&str>) -> Result<Option<T>, FilterError> {
    raw.map(|raw| {
        serde_json::from_str(raw).map_err(|e| FilterError(format!("`{name}` parameter: {e}")))
    })
    .transpose()
}

/// The filter `GET /todos` actually runs: soft-deleted rows are always
/// excluded and query paging wins over the filter's own paging.
fn active_filter(filter: Option<Filter>, limit: Option<u64>, offset: Option<u64>) -> Filter {
    let mut filter = filter.unwrap_or_default();
    let mut r#where = filter.r#where.take().unwrap_or_default();
    r#where.replace_eq("deletedAt", false);
    Filter {
        r#where: Some(r#where),
        fields: filter.fields.take(),
        limit: limit.or(filter.limit),
        skip: offset.or(filter.start()),
        offset: None,
        order: filter.order,
        include: None,
    }
}

fn project(todo: Todo, fields: Option<&Fields>) -> Result<Value, AppError> {
    let mut row = serde_json::to_value(todo)?;
    if let Some(fields) = fields {
        fields.project::<Todo>(&mut row);
    }
    Ok(row)
}

async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<Json<Todo>, AppError> {
    let Json(CreateTodoRequest { todo, items }) = body?;
    let todo = state.service.create_todo_with_items(todo, items).await?;
    Ok(Json(todo))
}

async fn count(
    State(state): State<AppState>,
    query: Result<Query<WhereQuery>, QueryRejection>,
) -> Result<Json<Count>, AppError> {
    let Query(query) = query?;
    let r#where: Option<Where> = json_param("where", query.r#where.as_deref())?;
    let count = state.todos.count(r#where.as_ref()).await?;
    Ok(Json(Count { count }))
}

async fn find(
    State(state): State<AppState>,
    query: Result<Query<FindQuery>, QueryRejection>,
) -> Result<Json<Vec<Value>>, AppError> {
    let Query(query) = query?;
    let filter = json_param("filter", query.filter.as_deref())?;
    let filter = active_filter(filter, query.limit, query.offset);

    let mut todos = state.todos.find(&filter).await?;
    include_items(state.items.as_ref(), &mut todos).await?;
    let rows: Vec<Value> = todos
        .into_iter()
        .map(|todo| project(todo, filter.fields.as_ref()))
        .collect::<Result<_, AppError>>()?;
    Ok(Json(rows))
}

async fn update_all(
    State(state): State<AppState>,
    query: Result<Query<WhereQuery>, QueryRejection>,
    body: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<Json<Count>, AppError> {
    let Query(query) = query?;
    let Json(patch) = body?;
    let r#where: Option<Where> = json_param("where", query.r#where.as_deref())?;
    let count = state.todos.update_all(&patch, r#where.as_ref()).await?;
    debug!(count, "updated todos");
    Ok(Json(Count { count }))
}

async fn find_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(id) = id?;
    let Query(query) = query?;
    // Only the projection applies; a lookup by id ignores `where` and paging.
    let filter: Option<Filter> = json_param("filter", query.filter.as_deref())?;
    let fields = filter.and_then(|f| f.fields);
    if let Some(fields) = &fields {
        fields.validate::<Todo>()?;
    }

    let todo = state.todos.find_by_id(id).await?;
    let mut todos = [todo];
    include_items(state.items.as_ref(), &mut todos).await?;
    let [todo] = todos;
    Ok(Json(project(todo, fields.as_ref())?))
}

async fn update_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    let Json(patch) = body?;
    state.todos.update_by_id(id, &patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<NewTodo>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    let Json(todo) = body?;
    state.todos.replace_by_id(id, todo).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    state.todos.delete_by_id(id).await?;
    let removed = state
        .items
        .delete_all(Some(&Where::new().equals("todoId", id)))
        .await?;
    debug!(todo_id = id, items = removed, "deleted todo");
    Ok(StatusCode::NO_CONTENT)
}
