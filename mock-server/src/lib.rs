//! In-memory stand-in for the GoRest `/public/v2` API.
//!
//! # Design
//! Mirrors the behaviour the suites assert against: integer ids, bearer-token
//! authentication on every non-GET request, `422` bodies shaped as an array of
//! `{"field", "message"}` objects, `404 {"message": "Resource not found"}` for
//! unknown resources and `204` with an empty body on delete. Deleting a user
//! cascades to its posts, their comments and the user's todos.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Token accepted by [`app`] callers that do not care about the credential.
pub const DEFAULT_TOKEN: &str = "mock-token";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub gender: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub name: String,
    pub email: String,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub due_on: Option<String>,
    pub status: String,
}

/// One entry of a `422` response body.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Store {
    next_id: i64,
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    todos: BTreeMap<i64, Todo>,
}

impl Store {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn remove_user(&mut self, id: i64) -> Option<User> {
        let user = self.users.remove(&id)?;
        let post_ids: Vec<i64> = self
            .posts
            .values()
            .filter(|p| p.user_id == id)
            .map(|p| p.id)
            .collect();
        self.posts.retain(|_, p| p.user_id != id);
        self.comments.retain(|_, c| !post_ids.contains(&c.post_id));
        self.todos.retain(|_, t| t.user_id != id);
        Some(user)
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    token: Arc<str>,
}

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Validation(Vec<FieldError>),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "Resource not found" })),
            )
                .into_response(),
            ApiError::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
            }
        }
    }
}

type Input = Map<String, Value>;

pub fn app(token: &str) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Store::default())),
        token: Arc::from(token),
    };
    Router::new()
        .route("/public/v2/users", get(list_users).post(create_user))
        .route(
            "/public/v2/users/{id}",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route(
            "/public/v2/users/{id}/posts",
            get(list_user_posts).post(create_post),
        )
        .route(
            "/public/v2/users/{id}/todos",
            get(list_user_todos).post(create_todo),
        )
        .route("/public/v2/posts", get(list_posts))
        .route("/public/v2/posts/{id}/comments", get(list_post_comments))
        .route("/public/v2/comments", get(list_comments).post(create_comment))
        .route("/public/v2/todos", get(list_todos))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run(listener: TcpListener, token: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(token)).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::GET {
        return next.run(request).await;
    }
    let expected = format!("Bearer {}", state.token);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        log::debug!("rejecting unauthenticated {} {}", request.method(), request.uri());
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Authentication failed" })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Trimmed, non-empty string value of `key`.
fn text(input: &Input, key: &str) -> Option<String> {
    match input.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn integer(input: &Input, key: &str) -> Option<i64> {
    match input.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn one_of(input: &Input, key: &str, allowed: &[&str]) -> Option<String> {
    text(input, key).filter(|v| allowed.contains(&v.as_str()))
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

fn reject(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

// --- users ---

async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    let db = state.db.read().await;
    Json(db.users.values().cloned().collect())
}

async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<Input>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let mut db = state.db.write().await;
    let mut errors = Vec::new();

    let name = text(&input, "name");
    if name.is_none() {
        errors.push(FieldError::new("name", "can't be blank"));
    }
    let email = text(&input, "email");
    match &email {
        None => errors.push(FieldError::new("email", "can't be blank")),
        Some(e) if !looks_like_email(e) => errors.push(FieldError::new("email", "is invalid")),
        Some(e) if db.email_taken(e, None) => {
            errors.push(FieldError::new("email", "has already been taken"))
        }
        Some(_) => {}
    }
    let gender = one_of(&input, "gender", &["male", "female"]);
    if gender.is_none() {
        errors.push(FieldError::new("gender", "can't be blank, can be male of female"));
    }
    let status = one_of(&input, "status", &["active", "inactive"]);
    if status.is_none() {
        errors.push(FieldError::new("status", "can't be blank"));
    }
    reject(errors)?;

    let user = User {
        id: db.allocate(),
        name: name.unwrap_or_default(),
        email: email.unwrap_or_default(),
        gender: gender.unwrap_or_default(),
        status: status.unwrap_or_default(),
    };
    log::info!("created user {}", user.id);
    db.users.insert(user.id, user.clone());
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let db = state.db.read().await;
    db.users.get(&id).cloned().map(Json).ok_or(ApiError::NotFound)
}

/// Shared by PUT and PATCH: only the keys present in the body are applied.
async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<Input>,
) -> Result<Json<User>, ApiError> {
    let mut db = state.db.write().await;
    if !db.users.contains_key(&id) {
        return Err(ApiError::NotFound);
    }
    let mut errors = Vec::new();
    let name = input.contains_key("name").then(|| text(&input, "name"));
    if let Some(None) = name {
        errors.push(FieldError::new("name", "can't be blank"));
    }
    let email = input.contains_key("email").then(|| text(&input, "email"));
    match &email {
        Some(None) => errors.push(FieldError::new("email", "can't be blank")),
        Some(Some(e)) if !looks_like_email(e) => {
            errors.push(FieldError::new("email", "is invalid"))
        }
        Some(Some(e)) if db.email_taken(e, Some(id)) => {
            errors.push(FieldError::new("email", "has already been taken"))
        }
        _ => {}
    }
    let gender = input
        .contains_key("gender")
        .then(|| one_of(&input, "gender", &["male", "female"]));
    if let Some(None) = gender {
        errors.push(FieldError::new("gender", "can't be blank, can be male of female"));
    }
    let status = input
        .contains_key("status")
        .then(|| one_of(&input, "status", &["active", "inactive"]));
    if let Some(None) = status {
        errors.push(FieldError::new("status", "can't be blank"));
    }
    reject(errors)?;

    let user = db.users.get_mut(&id).ok_or(ApiError::NotFound)?;
    if let Some(Some(name)) = name {
        user.name = name;
    }
    if let Some(Some(email)) = email {
        user.email = email;
    }
    if let Some(Some(gender)) = gender {
        user.gender = gender;
    }
    if let Some(Some(status)) = status {
        user.status = status;
    }
    Ok(Json(user.clone()))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut db = state.db.write().await;
    let user = db.remove_user(id).ok_or(ApiError::NotFound)?;
    log::info!("deleted user {}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

// --- posts ---

async fn list_posts(State(state): State<AppState>) -> Json<Vec<Post>> {
    let db = state.db.read().await;
    Json(db.posts.values().cloned().collect())
}

async fn list_user_posts(State(state): State<AppState>, Path(id): Path<i64>) -> Json<Vec<Post>> {
    let db = state.db.read().await;
    Json(db.posts.values().filter(|p| p.user_id == id).cloned().collect())
}

async fn create_post(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(input): Json<Input>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let mut db = state.db.write().await;
    let mut errors = Vec::new();
    if !db.users.contains_key(&user_id) {
        errors.push(FieldError::new("user", "must exist"));
    }
    let title = text(&input, "title");
    if title.is_none() {
        errors.push(FieldError::new("title", "can't be blank"));
    }
    let body = text(&input, "body");
    if body.is_none() {
        errors.push(FieldError::new("body", "can't be blank"));
    }
    reject(errors)?;

    let post = Post {
        id: db.allocate(),
        user_id,
        title: title.unwrap_or_default(),
        body: body.unwrap_or_default(),
    };
    db.posts.insert(post.id, post.clone());
    Ok((StatusCode::CREATED, Json(post)))
}

// --- comments ---

async fn list_comments(State(state): State<AppState>) -> Json<Vec<Comment>> {
    let db = state.db.read().await;
    Json(db.comments.values().cloned().collect())
}

async fn list_post_comments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<Vec<Comment>> {
    let db = state.db.read().await;
    Json(db.comments.values().filter(|c| c.post_id == id).cloned().collect())
}

async fn create_comment(
    State(state): State<AppState>,
    Json(input): Json<Input>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let mut db = state.db.write().await;
    let mut errors = Vec::new();
    let post_id = integer(&input, "post_id");
    match post_id {
        None => {
            errors.push(FieldError::new("post", "must exist"));
            errors.push(FieldError::new("post_id", "is not a number"));
        }
        Some(id) if !db.posts.contains_key(&id) => {
            errors.push(FieldError::new("post", "must exist"))
        }
        Some(_) => {}
    }
    let name = text(&input, "name");
    if name.is_none() {
        errors.push(FieldError::new("name", "can't be blank"));
    }
    let email = text(&input, "email");
    match &email {
        None => errors.push(FieldError::new("email", "can't be blank, is invalid")),
        Some(e) if !looks_like_email(e) => errors.push(FieldError::new("email", "is invalid")),
        Some(_) => {}
    }
    let body = text(&input, "body");
    if body.is_none() {
        errors.push(FieldError::new("body", "can't be blank"));
    }
    reject(errors)?;

    let comment = Comment {
        id: db.allocate(),
        post_id: post_id.unwrap_or_default(),
        name: name.unwrap_or_default(),
        email: email.unwrap_or_default(),
        body: body.unwrap_or_default(),
    };
    db.comments.insert(comment.id, comment.clone());
    Ok((StatusCode::CREATED, Json(comment)))
}

// --- todos ---

async fn list_todos(State(state): State<AppState>) -> Json<Vec<Todo>> {
    let db = state.db.read().await;
    Json(db.todos.values().cloned().collect())
}

async fn list_user_todos(State(state): State<AppState>, Path(id): Path<i64>) -> Json<Vec<Todo>> {
    let db = state.db.read().await;
    Json(db.todos.values().filter(|t| t.user_id == id).cloned().collect())
}

async fn create_todo(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(input): Json<Input>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let mut db = state.db.write().await;
    let mut errors = Vec::new();
    if !db.users.contains_key(&user_id) {
        errors.push(FieldError::new("user", "must exist"));
    }
    let title = text(&input, "title");
    if title.is_none() {
        errors.push(FieldError::new("title", "can't be blank"));
    }
    let status = one_of(&input, "status", &["pending", "completed"]);
    if status.is_none() {
        errors.push(FieldError::new(
            "status",
            "can't be blank, can be pending or completed",
        ));
    }
    reject(errors)?;

    let todo = Todo {
        id: db.allocate(),
        user_id,
        title: title.unwrap_or_default(),
        due_on: text(&input, "due_on"),
        status: status.unwrap_or_default(),
    };
    db.todos.insert(todo.id, todo.clone());
    Ok((StatusCode::CREATED, Json(todo)))
}
