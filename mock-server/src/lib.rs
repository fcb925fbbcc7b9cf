use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Number of 503 answers `/flaky` gives before it starts succeeding.
pub const FLAKY_FAILURES: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct CreateTodo {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Deserialize)]
pub struct ListFilter {
    pub completed: Option<bool>,
}

#[derive(Deserialize)]
pub struct SignIn {
    pub user: String,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Todo>>>;

#[derive(Clone, Default)]
pub struct AppState {
    pub db: Db,
    pub flaky_calls: Arc<AtomicUsize>,
}

/// An error answered as `{"error": message}`.
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/{id}",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/slow", get(slow))
        .route("/echo", any(echo))
        .route("/flaky", get(flaky))
        .route("/session", post(sign_in))
        .route("/whoami", get(whoami))
        .with_state(AppState::default())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn list_todos(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> Json<Vec<Todo>> {
    let todos = state.db.read().await;
    Json(
        todos
            .values()
            .filter(|todo| filter.completed.map_or(true, |c| todo.completed == c))
            .cloned()
            .collect(),
    )
}

async fn create_todo(
    State(state): State<AppState>,
    Json(input): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), ApiFailure> {
    if input.title.trim().is_empty() {
        return Err(ApiFailure::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "title must not be empty",
        ));
    }
    let todo = Todo {
        id: Uuid::new_v4(),
        title: input.title,
        completed: input.completed,
    };
    state.db.write().await.insert(todo.id, todo.clone());
    tracing::debug!(id = %todo.id, "todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Todo>, ApiFailure> {
    let todos = state.db.read().await;
    todos.get(&id).cloned().map(Json).ok_or_else(not_found)
}

async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTodo>,
) -> Result<Json<Todo>, ApiFailure> {
    let mut todos = state.db.write().await;
    let todo = todos.get_mut(&id).ok_or_else(not_found)?;
    if let Some(title) = input.title {
        todo.title = title;
    }
    if let Some(completed) = input.completed {
        todo.completed = completed;
    }
    Ok(Json(todo.clone()))
}

async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiFailure> {
    let mut todos = state.db.write().await;
    todos
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(not_found)
}

fn not_found() -> ApiFailure {
    ApiFailure::new(StatusCode::NOT_FOUND, "todo not found")
}

#[derive(Deserialize)]
struct Delay {
    #[serde(default = "default_delay_ms")]
    ms: u64,
}

fn default_delay_ms() -> u64 {
    5_000
}

/// Answers after `ms` milliseconds.
async fn slow(Query(delay): Query<Delay>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(delay.ms)).await;
    Json(json!({ "waited_ms": delay.ms }))
}

/// Reflects the request back as JSON.
async fn echo(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "body": body,
        "authorization": authorization,
    }))
}

/// Fails with 503 for the first [`FLAKY_FAILURES`] calls.
async fn flaky(State(state): State<AppState>) -> Result<Json<Value>, ApiFailure> {
    let call = state.flaky_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call <= FLAKY_FAILURES {
        return Err(ApiFailure::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "temporarily unavailable",
        ));
    }
    Ok(Json(json!({ "calls": call })))
}

async fn sign_in(Json(input): Json<SignIn>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, format!("session={}; Path=/", input.user))],
        Json(json!({ "user": input.user })),
    )
}

async fn whoami(headers: HeaderMap) -> Result<Json<Value>, ApiFailure> {
    session_user(&headers)
        .map(|user| Json(json!({ "user": user })))
        .ok_or_else(|| ApiFailure::new(StatusCode::UNAUTHORIZED, "not signed in"))
}

fn session_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "session")
        .map(|(_, value)| value.to_string())
}
