//! Stateless HTTP request builder and response parser for the todo API.
//!
//! # Design
//! `TodoClient` holds only a `base_url` and carries no mutable state between
//! calls. Each route is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! Filters are sent the way the server expects them: JSON-encoded in the
//! `filter` or `where` query parameter.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::filter::{Filter, Where};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Count, CreateTodoRequest, NewTodo, Todo, TodoPatch};

/// Query parameters of `GET /todos`. `limit` and `offset` take precedence
/// over the filter's own `limit` and `skip` on the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Synchronous, stateless client for the todo API.
#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
}

impl TodoClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn build_create_todo(&self, input: &CreateTodoRequest) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::with_json(
            HttpMethod::Post,
            self.url("/todos", &[])?,
            to_json(input)?,
        ))
    }

    pub fn build_count_todos(&self, r#where: Option<&Where>) -> Result<HttpRequest, ApiError> {
        let query = json_param("where", r#where)?;
        Ok(HttpRequest::without_body(
            HttpMethod::Get,
            self.url("/todos/count", &query)?,
        ))
    }

    pub fn build_list_todos(&self, query: &ListQuery) -> Result<HttpRequest, ApiError> {
        let mut params = json_param("filter", query.filter.as_ref())?;
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = query.offset {
            params.push(("offset", offset.to_string()));
        }
        Ok(HttpRequest::without_body(
            HttpMethod::Get,
            self.url("/todos", &params)?,
        ))
    }

    pub fn build_update_all(
        &self,
        patch: &TodoPatch,
        r#where: Option<&Where>,
    ) -> Result<HttpRequest, ApiError> {
        let query = json_param("where", r#where)?;
        Ok(HttpRequest::with_json(
            HttpMethod::Patch,
            self.url("/todos", &query)?,
            to_json(patch)?,
        ))
    }

    pub fn build_get_todo(&self, id: i64, filter: Option<&Filter>) -> Result<HttpRequest, ApiError> {
        let query = json_param("filter", filter)?;
        Ok(HttpRequest::without_body(
            HttpMethod::Get,
            self.url(&format!("/todos/{id}"), &query)?,
        ))
    }

    pub fn build_update_todo(&self, id: i64, patch: &TodoPatch) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::with_json(
            HttpMethod::Patch,
            self.url(&format!("/todos/{id}"), &[])?,
            to_json(patch)?,
        ))
    }

    pub fn build_replace_todo(&self, id: i64, todo: &NewTodo) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::with_json(
            HttpMethod::Put,
            self.url(&format!("/todos/{id}"), &[])?,
            to_json(todo)?,
        ))
    }

    pub fn build_delete_todo(&self, id: i64) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::without_body(
            HttpMethod::Delete,
            self.url(&format!("/todos/{id}"), &[])?,
        ))
    }

    pub fn parse_create_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        parse_json(response, 200)
    }

    pub fn parse_count_todos(&self, response: HttpResponse) -> Result<Count, ApiError> {
        parse_json(response, 200)
    }

    pub fn parse_list_todos(&self, response: HttpResponse) -> Result<Vec<Todo>, ApiError> {
        parse_json(response, 200)
    }

    pub fn parse_update_all(&self, response: HttpResponse) -> Result<Count, ApiError> {
        parse_json(response, 200)
    }

    pub fn parse_get_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        parse_json(response, 200)
    }

    pub fn parse_update_todo(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 204)
    }

    pub fn parse_replace_todo(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 204)
    }

    pub fn parse_delete_todo(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 204)
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        if query.is_empty() {
            return Ok(format!("{}{path}", self.base_url));
        }
        let encoded = serde_urlencoded::to_string(query)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(format!("{}{path}?{encoded}", self.base_url))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::SerializationError(e.to_string()))
}

fn json_param<T: Serialize>(
    name: &'static str,
    value: Option<&T>,
) -> Result<Vec<(&'static str, String)>, ApiError> {
    match value {
        Some(value) => Ok(vec![(name, to_json(value)?)]),
        None => Ok(Vec::new()),
    }
}

fn parse_json<T: DeserializeOwned>(response: HttpResponse, expected: u16) -> Result<T, ApiError> {
    check_status(&response, expected)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}
