use crate::{
    error::Error,
    todos::{Todo, TodoRepository},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tide::{Body, Request, Response, StatusCode};

pub const DEFAULT_STATUS: &str = "pending";

#[derive(Clone)]
pub struct State {
    pub todos: Arc<dyn TodoRepository>,
}

impl State {
    pub fn new(todos: impl TodoRepository + 'static) -> State {
        State {
            todos: Arc::new(todos),
        }
    }
}

#[derive(Deserialize)]
struct NewTodo {
    title: String,
    #[serde(default = "default_status")]
    status: String,
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

#[derive(Deserialize)]
struct ReplaceTodo {
    title: String,
    status: String,
}

#[derive(Deserialize)]
struct ChangeStatus {
    status: String,
}

#[derive(Deserialize)]
struct ChangeTitle {
    title: String,
}

/// The fields a partial update touched, plus the id they belong to.
#[derive(Serialize)]
struct TodoFragment {
    id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

fn todo_id(req: &Request<State>) -> Result<i32, Error> {
    let raw = req
        .param("id")
        .map_err(|_| Error::Validation("missing todo id".to_string()))?;
    raw.parse::<i32>()
        .map_err(|_| Error::Validation(format!("invalid todo id `{}`", raw)))
}

async fn payload<T: DeserializeOwned>(req: &mut Request<State>) -> Result<T, Error> {
    let bytes = req
        .body_bytes()
        .await
        .map_err(|e| Error::Validation(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Validation(e.to_string()))
}

fn reply(status: StatusCode, value: &impl Serialize) -> tide::Result {
    let mut response = Response::new(status);
    response.set_body(Body::from_json(value)?);
    Ok(response)
}

pub async fn list_todos(req: Request<State>) -> tide::Result {
    let todos = req.state().todos.list_all().await?;
    reply(StatusCode::Ok, &todos)
}

pub async fn get_todo(req: Request<State>) -> tide::Result {
    let id = todo_id(&req)?;
    let todo = req.state().todos.get_by_id(id).await?;
    reply(StatusCode::Ok, &todo)
}

pub async fn create_todo(mut req: Request<State>) -> tide::Result {
    let new: NewTodo = payload(&mut req).await?;
    let todo = req.state().todos.create(new.title, new.status).await?;
    reply(StatusCode::Created, &todo)
}

pub async fn replace_todo(mut req: Request<State>) -> tide::Result {
    let id = todo_id(&req)?;
    let replacement: ReplaceTodo = payload(&mut req).await?;
    let todo: Todo = req
        .state()
        .todos
        .update_full(id, replacement.title, replacement.status)
        .await?;
    reply(StatusCode::Ok, &todo)
}

pub async fn change_status(mut req: Request<State>) -> tide::Result {
    let id = todo_id(&req)?;
    let change: ChangeStatus = payload(&mut req).await?;
    req.state()
        .todos
        .update_status(id, change.status.clone())
        .await?;
    reply(
        StatusCode::Ok,
        &TodoFragment {
            id,
            title: None,
            status: Some(change.status),
        },
    )
}

pub async fn change_title(mut req: Request<State>) -> tide::Result {
    let id = todo_id(&req)?;
    let change: ChangeTitle = payload(&mut req).await?;
    req.state()
        .todos
        .update_title(id, change.title.clone())
        .await?;
    reply(
        StatusCode::Ok,
        &TodoFragment {
            id,
            title: Some(change.title),
            status: None,
        },
    )
}

pub async fn delete_todo(req: Request<State>) -> tide::Result {
    let id = todo_id(&req)?;
    req.state().todos.delete(id).await?;
    reply(StatusCode::Ok, &json!({ "response": "success" }))
}
