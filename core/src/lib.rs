//! Shared types and a synchronous API client for the todo service.
//!
//! # Overview
//! - `types`: the Todo/Item wire models and request payloads.
//! - `filter`: the JSON filter language accepted by the list, count and
//!   update-all endpoints, with an in-process evaluator.
//! - `client`: builds `HttpRequest` values and parses `HttpResponse` values
//!   without touching the network (host-does-IO pattern).
//!
//! # Design
//! The server crate depends on `types` and `filter` so both sides agree on
//! the schema by construction; the client is exercised end-to-end against
//! the real router in `tests/integration.rs`.

pub mod client;
pub mod error;
pub mod filter;
pub mod http;
pub mod types;

pub use client::{ListQuery, TodoClient};
pub use error::ApiError;
pub use filter::{Clause, Fields, Filter, FilterError, Operator, Order, Where};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use types::{
    Count, CreateTodoRequest, Item, Model, NewItem, NewTodo, Todo, TodoPatch, TodoStatus,
};
