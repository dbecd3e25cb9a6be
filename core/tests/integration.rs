//! Full lifecycle test against the live server.
//!
//! # Design
//! Starts the server on a random port over a fresh in-memory store, then
//! exercises every client operation over real HTTP using ureq. Validates
//! that the client's request building and response parsing agree with the
//! actual router, query-string filters included.

use todo_core::{
    ApiError, CreateTodoRequest, Filter, HttpMethod, HttpResponse, ListQuery, NewItem, NewTodo,
    TodoClient, TodoPatch, TodoStatus, Where,
};

/// Execute an `HttpRequest` using ureq and return an `HttpResponse`.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data rather than `Err`, letting the client
/// handle status interpretation.
fn execute(req: todo_core::HttpRequest) -> HttpResponse {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let mut response = match (req.method, req.body) {
        (HttpMethod::Get, _) => agent.get(&req.path).call(),
        (HttpMethod::Delete, _) => agent.delete(&req.path).call(),
        (HttpMethod::Post, Some(body)) => {
            agent.post(&req.path).content_type("application/json").send(body.as_bytes())
        }
        (HttpMethod::Post, None) => agent.post(&req.path).send_empty(),
        (HttpMethod::Put, Some(body)) => {
            agent.put(&req.path).content_type("application/json").send(body.as_bytes())
        }
        (HttpMethod::Put, None) => agent.put(&req.path).send_empty(),
        (HttpMethod::Patch, Some(body)) => {
            agent.patch(&req.path).content_type("application/json").send(body.as_bytes())
        }
        (HttpMethod::Patch, None) => agent.patch(&req.path).send_empty(),
    }
    .expect("HTTP transport error");

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();

    HttpResponse {
        status,
        headers: Vec::new(),
        body,
    }
}

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            todo_server::run(listener, todo_server::AppState::in_memory()).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

#[test]
fn crud_lifecycle() {
    let client = TodoClient::new(&start_server());

    // Step 1: list, should be empty.
    let req = client.build_list_todos(&ListQuery::default()).unwrap();
    let todos = client.parse_list_todos(execute(req)).unwrap();
    assert!(todos.is_empty(), "expected empty list");

    // Step 2: create a todo with two items.
    let input = CreateTodoRequest {
        todo: NewTodo::new("Integration test", TodoStatus::Active),
        items: vec![NewItem::new("first", false), NewItem::new("second", true)],
    };
    let req = client.build_create_todo(&input).unwrap();
    let created = client.parse_create_todo(execute(req)).unwrap();
    assert_eq!(created.title, "Integration test");
    assert!(created.items.is_none());
    let id = created.id;

    // Step 3: get, items included.
    let req = client.build_get_todo(id, None).unwrap();
    let fetched = client.parse_get_todo(execute(req)).unwrap();
    let items = fetched.items.as_ref().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.todo_id == id));

    // Step 4: partial update.
    let patch = TodoPatch {
        title: Some("Updated title".to_string()),
        ..TodoPatch::default()
    };
    let req = client.build_update_todo(id, &patch).unwrap();
    client.parse_update_todo(execute(req)).unwrap();

    // Step 5: full replace.
    let replacement = NewTodo {
        subtitle: Some("replaced".to_string()),
        ..NewTodo::new("Replaced", TodoStatus::Inactive)
    };
    let req = client.build_replace_todo(id, &replacement).unwrap();
    client.parse_replace_todo(execute(req)).unwrap();
    let req = client.build_get_todo(id, None).unwrap();
    let fetched = client.parse_get_todo(execute(req)).unwrap();
    assert_eq!(fetched.title, "Replaced");
    assert_eq!(fetched.status, TodoStatus::Inactive);
    assert_eq!(fetched.subtitle.as_deref(), Some("replaced"));

    // Step 6: a second todo, then filtered count and list.
    let input = CreateTodoRequest {
        todo: NewTodo::new("Other", TodoStatus::Active),
        items: Vec::new(),
    };
    let req = client.build_create_todo(&input).unwrap();
    let other = client.parse_create_todo(execute(req)).unwrap();

    let active = Where::new().equals("status", "ACTIVE");
    let req = client.build_count_todos(Some(&active)).unwrap();
    assert_eq!(client.parse_count_todos(execute(req)).unwrap().count, 1);

    let query = ListQuery {
        filter: Some(Filter {
            r#where: Some(active.clone()),
            ..Filter::default()
        }),
        ..ListQuery::default()
    };
    let req = client.build_list_todos(&query).unwrap();
    let todos = client.parse_list_todos(execute(req)).unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, other.id);

    // Step 7: soft-delete everything active; the list hides it.
    let patch = TodoPatch {
        deleted_at: Some(true),
        ..TodoPatch::default()
    };
    let req = client.build_update_all(&patch, Some(&active)).unwrap();
    assert_eq!(client.parse_update_all(execute(req)).unwrap().count, 1);

    let req = client.build_list_todos(&ListQuery::default()).unwrap();
    let todos = client.parse_list_todos(execute(req)).unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, id);

    // Step 8: delete.
    let req = client.build_delete_todo(id).unwrap();
    client.parse_delete_todo(execute(req)).unwrap();

    // Step 9: get after delete, should be NotFound.
    let req = client.build_get_todo(id, None).unwrap();
    let err = client.parse_get_todo(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    // Step 10: delete again, should be NotFound.
    let req = client.build_delete_todo(id).unwrap();
    let err = client.parse_delete_todo(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    // Step 11: list, should be empty again (the other todo is soft-deleted).
    let req = client.build_list_todos(&ListQuery::default()).unwrap();
    let todos = client.parse_list_todos(execute(req)).unwrap();
    assert!(todos.is_empty(), "expected empty list after delete");
}

#[test]
fn invalid_filter_is_an_http_error() {
    let client = TodoClient::new(&start_server());

    let bad = Where::new().equals("priority", 1);
    let req = client.build_count_todos(Some(&bad)).unwrap();
    let err = client.parse_count_todos(execute(req)).unwrap_err();
    match err {
        ApiError::HttpError { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("INVALID_FILTER"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
