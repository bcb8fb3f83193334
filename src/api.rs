//! HTTP API for the taskboard server

use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::TaskError;
use crate::models::{NewTask, Priority, StatusFilter, Task, TaskId, TaskStatistics, UpdateTask};
use crate::store::TaskStore;

/// Application state shared across handlers
pub struct AppState {
    pub store: TaskStore,
    pub config: Config,
}

impl AppState {
    pub fn new(store: TaskStore, config: Config) -> Arc<Self> {
        Arc::new(Self { store, config })
    }
}

/// Name of the authenticated token owner, set by the auth middleware
#[derive(Debug, Clone)]
pub struct Owner(pub String);

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/me", get(current_user))
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/statistics", get(statistics))
        .route("/api/todos/by-date", get(todos_by_date))
        .route("/api/todos/by-priority", get(todos_by_priority))
        .route("/api/todos/by-category", get(todos_by_category))
        .route(
            "/api/todos/{id}",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/api/todos/{id}/toggle", patch(toggle_todo))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint (no auth required)
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "taskboard",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Auth middleware - validates Bearer token and records its owner
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(owner) = token.and_then(|t| state.config.authenticate(t)) else {
        tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated request");
        return ApiError::from(TaskError::Unauthorized).into_response();
    };

    request.extensions_mut().insert(Owner(owner.to_string()));
    next.run(request).await
}

async fn current_user(Extension(Owner(owner)): Extension<Owner>) -> impl IntoResponse {
    Json(serde_json::json!({ "username": owner }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: StatusFilter,
    /// Apply display ordering instead of insertion order
    #[serde(default)]
    sorted: bool,
}

async fn list_todos(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query.map_err(rejected)?;
    let tasks = state.store.list(&owner, query.status, query.sorted)?;
    Ok(Json(tasks))
}

async fn create_todo(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(request) = body.map_err(rejected)?;
    let task = state.store.create(&owner, request)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_todo(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    id: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = id.map_err(rejected)?;
    Ok(Json(state.store.get(&owner, id)?))
}

async fn update_todo(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    id: Result<Path<TaskId>, PathRejection>,
    body: Result<Json<UpdateTask>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = id.map_err(rejected)?;
    let Json(update) = body.map_err(rejected)?;
    Ok(Json(state.store.update(&owner, id, &update)?))
}

async fn toggle_todo(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    id: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = id.map_err(rejected)?;
    Ok(Json(state.store.toggle(&owner, id)?))
}

async fn delete_todo(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    id: Result<Path<TaskId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(rejected)?;
    state.store.delete(&owner, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn statistics(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Result<Json<TaskStatistics>, ApiError> {
    Ok(Json(state.store.statistics(&owner)?))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: NaiveDate,
}

async fn todos_by_date(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query.map_err(rejected)?;
    Ok(Json(state.store.by_date(&owner, query.date)?))
}

#[derive(Debug, Deserialize)]
struct PriorityQuery {
    priority: Priority,
}

async fn todos_by_priority(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    query: Result<Query<PriorityQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query.map_err(rejected)?;
    Ok(Json(state.store.by_priority(&owner, query.priority)?))
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    category: String,
}

async fn todos_by_category(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    query: Result<Query<CategoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query.map_err(rejected)?;
    Ok(Json(state.store.by_category(&owner, &query.category)?))
}

fn rejected(rejection: impl std::fmt::Display) -> ApiError {
    TaskError::RequestFailed(rejection.to_string()).into()
}

/// API error type
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<TaskError>() {
            Some(TaskError::Validation(_) | TaskError::RequestFailed(_)) => StatusCode::BAD_REQUEST,
            Some(TaskError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(TaskError::Unauthorized) => StatusCode::UNAUTHORIZED,
            Some(TaskError::Storage(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "API error");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::db::MemoryGateway;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const ALICE: &str = "alice-token";
    const BOB: &str = "bob-token";

    fn app() -> Router {
        let mut config = Config::default();
        for (name, token) in [("alice", ALICE), ("bob", BOB)] {
            config.tokens.push(TokenConfig {
                name: name.to_string(),
                token_hash: token.to_string(),
            });
        }
        let store = TaskStore::new(Arc::new(MemoryGateway::new()), "todos");
        create_router(AppState::new(store, config))
    }

    fn request(
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = app();
        let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_or_invalid_token_is_unauthorized() {
        let app = app();
        let (status, _) = send(&app, request(Method::GET, "/api/todos", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            send(&app, request(Method::GET, "/api/todos", Some("nope"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn current_user_reports_token_owner() {
        let app = app();
        let (status, body) =
            send(&app, request(Method::GET, "/api/auth/me", Some(BOB), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "bob");
    }

    #[tokio::test]
    async fn create_toggle_and_delete() {
        let app = app();
        let (status, created) = send(
            &app,
            request(
                Method::POST,
                "/api/todos",
                Some(ALICE),
                Some(json!({ "title": "Write report", "priority": "HIGH", "dueTime": "09:00" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], 1);
        assert_eq!(created["completed"], false);
        assert_eq!(created["priority"], "HIGH");
        assert!(created["createdAt"].is_string());

        let (status, toggled) = send(
            &app,
            request(Method::PATCH, "/api/todos/1/toggle", Some(ALICE), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["completed"], true);

        let (_, stats) = send(
            &app,
            request(Method::GET, "/api/todos/statistics", Some(ALICE), None),
        )
        .await;
        assert_eq!(
            stats,
            json!({
                "totalTasks": 1,
                "completedTasks": 1,
                "pendingTasks": 0,
                "completionRate": 100
            })
        );

        let (status, _) = send(
            &app,
            request(Method::DELETE, "/api/todos/1", Some(ALICE), None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, request(Method::GET, "/api/todos/1", Some(ALICE), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_title_is_bad_request() {
        let app = app();
        let (status, body) = send(
            &app,
            request(Method::POST, "/api/todos", Some(ALICE), Some(json!({ "title": "   " }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("title"));

        let (_, list) = send(&app, request(Method::GET, "/api/todos", Some(ALICE), None)).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = app();
        let (status, _) = send(
            &app,
            request(
                Method::POST,
                "/api/todos",
                Some(ALICE),
                Some(json!({ "title": "x", "dueTime": "7pm" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_replaces_given_fields() {
        let app = app();
        send(
            &app,
            request(
                Method::POST,
                "/api/todos",
                Some(ALICE),
                Some(json!({ "title": "Draft", "category": "work", "dueDate": "2024-06-01" })),
            ),
        )
        .await;

        let (status, updated) = send(
            &app,
            request(
                Method::PUT,
                "/api/todos/1",
                Some(ALICE),
                Some(json!({ "title": "Final", "dueDate": null })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Final");
        assert_eq!(updated["category"], "work");
        assert_eq!(updated["dueDate"], Value::Null);

        let (status, _) = send(
            &app,
            request(Method::PUT, "/api/todos/42", Some(ALICE), Some(json!({ "title": "x" }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_filters_sorts_and_queries() {
        let app = app();
        for body in [
            json!({ "title": "a", "priority": "LOW", "category": "home" }),
            json!({
                "title": "b",
                "priority": "HIGH",
                "dueDate": "2024-06-01",
                "dueTime": "09:00"
            }),
            json!({
                "title": "c",
                "priority": "HIGH",
                "dueDate": "2024-06-01",
                "dueTime": "08:00"
            }),
        ] {
            send(&app, request(Method::POST, "/api/todos", Some(ALICE), Some(body))).await;
        }
        send(&app, request(Method::PATCH, "/api/todos/1/toggle", Some(ALICE), None)).await;

        let titles = |v: &Value| -> Vec<String> {
            v.as_array()
                .unwrap()
                .iter()
                .map(|t| t["title"].as_str().unwrap().to_string())
                .collect()
        };

        let (_, sorted) =
            send(&app, request(Method::GET, "/api/todos?sorted=true", Some(ALICE), None)).await;
        assert_eq!(titles(&sorted), vec!["c", "b", "a"]);

        let (_, active) = send(
            &app,
            request(Method::GET, "/api/todos?status=not-started", Some(ALICE), None),
        )
        .await;
        assert_eq!(titles(&active), vec!["b", "c"]);

        let (_, by_date) = send(
            &app,
            request(Method::GET, "/api/todos/by-date?date=2024-06-01", Some(ALICE), None),
        )
        .await;
        assert_eq!(titles(&by_date), vec!["b", "c"]);

        let (_, by_priority) = send(
            &app,
            request(Method::GET, "/api/todos/by-priority?priority=LOW", Some(ALICE), None),
        )
        .await;
        assert_eq!(titles(&by_priority), vec!["a"]);

        let (_, by_category) = send(
            &app,
            request(Method::GET, "/api/todos/by-category?category=Home", Some(ALICE), None),
        )
        .await;
        assert_eq!(titles(&by_category), vec!["a"]);

        let (status, _) = send(
            &app,
            request(Method::GET, "/api/todos?status=archived", Some(ALICE), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            request(Method::GET, "/api/todos/by-date?date=tomorrow", Some(ALICE), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_numeric_id_gets_json_error() {
        let app = app();
        for (method, uri) in [
            (Method::GET, "/api/todos/abc"),
            (Method::PATCH, "/api/todos/abc/toggle"),
            (Method::DELETE, "/api/todos/abc"),
        ] {
            let (status, body) = send(&app, request(method, uri, Some(ALICE), None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string(), "{uri} returned {body}");
        }

        let (status, body) = send(
            &app,
            request(Method::PUT, "/api/todos/abc", Some(ALICE), Some(json!({ "title": "x" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn blank_form_fields_are_treated_as_absent() {
        let app = app();
        let (status, created) = send(
            &app,
            request(
                Method::POST,
                "/api/todos",
                Some(ALICE),
                Some(json!({ "title": "Stretch", "dueDate": "", "dueTime": "", "category": "" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["dueDate"], Value::Null);
        assert_eq!(created["dueTime"], Value::Null);
        assert_eq!(created["category"], Value::Null);

        send(
            &app,
            request(
                Method::PUT,
                "/api/todos/1",
                Some(ALICE),
                Some(json!({ "dueTime": "06:30", "category": "health" })),
            ),
        )
        .await;
        let (status, cleared) = send(
            &app,
            request(Method::PUT, "/api/todos/1", Some(ALICE), Some(json!({ "dueTime": "" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["dueTime"], Value::Null);
        assert_eq!(cleared["category"], "health");
    }

    #[tokio::test]
    async fn put_with_completed_reaches_that_state() {
        let app = app();
        send(
            &app,
            request(Method::POST, "/api/todos", Some(ALICE), Some(json!({ "title": "Mop" }))),
        )
        .await;

        for expected in [true, true, false] {
            let (status, updated) = send(
                &app,
                request(
                    Method::PUT,
                    "/api/todos/1",
                    Some(ALICE),
                    Some(json!({ "completed": expected })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(updated["completed"], expected);
        }
    }

    #[tokio::test]
    async fn owners_see_only_their_tasks() {
        let app = app();
        send(
            &app,
            request(Method::POST, "/api/todos", Some(ALICE), Some(json!({ "title": "private" }))),
        )
        .await;

        let (_, list) = send(&app, request(Method::GET, "/api/todos", Some(BOB), None)).await;
        assert_eq!(list, json!([]));

        let (status, _) = send(
            &app,
            request(Method::PATCH, "/api/todos/1/toggle", Some(BOB), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
