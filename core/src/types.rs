//! Domain DTOs for the todo API.
//!
//! # Design
//! Response models (`Todo`, `Item`) are shared by the server and the client.
//! Input models (`NewTodo`, `NewItem`, `TodoPatch`) reject unknown
//! properties so a misspelled field fails validation instead of being
//! silently dropped. JSON property names are camelCase on the wire.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A persisted entity whose properties may be referenced from a filter.
pub trait Model {
    /// Model name used in error messages.
    const NAME: &'static str;
    /// Wire names of the properties a `where` or `order` clause may use.
    const PROPERTIES: &'static [&'static str];
}

/// Lifecycle status of a todo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoStatus {
    Active,
    Inactive,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Active => "ACTIVE",
            TodoStatus::Inactive => "INACTIVE",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown todo status: {0:?}")]
pub struct ParseStatusError(String);

impl FromStr for TodoStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(TodoStatus::Active),
            "INACTIVE" => Ok(TodoStatus::Inactive),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A todo as returned by the API.
///
/// `items` is only present when the relation was included (list and
/// find-by-id); the create response carries the bare todo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Soft-delete flag. `false` means the todo is active.
    #[serde(default)]
    pub deleted_at: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
}

impl Model for Todo {
    const NAME: &'static str = "Todo";
    const PROPERTIES: &'static [&'static str] = &["id", "title", "status", "subtitle", "deletedAt"];
}

/// A checklist entry belonging to exactly one todo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub content: String,
    pub is_complete: bool,
    pub todo_id: i64,
}

impl Model for Item {
    const NAME: &'static str = "Item";
    const PROPERTIES: &'static [&'static str] = &["id", "content", "isComplete", "todoId"];
}

/// Payload for creating or fully replacing a todo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTodo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub deleted_at: bool,
}

impl NewTodo {
    pub fn new(title: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            id: None,
            title: title.into(),
            status,
            subtitle: None,
            deleted_at: false,
        }
    }

    /// Materialize the stored row under `id`. The payload's own id is ignored.
    pub fn into_todo(self, id: i64) -> Todo {
        Todo {
            id,
            title: self.title,
            status: self.status,
            subtitle: self.subtitle,
            deleted_at: self.deleted_at,
            items: None,
        }
    }
}

/// Payload for creating an item. `todo_id` is assigned by the service when
/// items are created together with their todo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub content: String,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_id: Option<i64>,
}

impl NewItem {
    pub fn new(content: impl Into<String>, is_complete: bool) -> Self {
        Self {
            id: None,
            content: content.into(),
            is_complete,
            todo_id: None,
        }
    }
}

/// Partial update of a todo. Only the fields present in the JSON are
/// applied; `"subtitle": null` clears the subtitle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TodoStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub subtitle: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<bool>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.subtitle.is_none()
            && self.deleted_at.is_none()
    }

    pub fn apply(&self, todo: &mut Todo) {
        if let Some(title) = &self.title {
            todo.title = title.clone();
        }
        if let Some(status) = self.status {
            todo.status = status;
        }
        if let Some(subtitle) = &self.subtitle {
            todo.subtitle = subtitle.clone();
        }
        if let Some(deleted_at) = self.deleted_at {
            todo.deleted_at = deleted_at;
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request body of `POST /todos`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreateTodoRequest {
    pub todo: NewTodo,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

/// Response body of the count and update-all endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Count {
    pub count: u64,
}
