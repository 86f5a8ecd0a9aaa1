#![allow(dead_code)]

use async_std::{sync::RwLock, task};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tide::{
    http::{Method, Request, Response, Url},
    StatusCode,
};
use todo_api::{error::Result, Error, State, Todo, TodoRepository};

/// Keeps todos in memory, optionally taking `delay` over every call.
#[derive(Default)]
pub struct MemoryTodos {
    todos: RwLock<Vec<Todo>>,
    next_id: RwLock<i32>,
    delay: Duration,
}

impl MemoryTodos {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    async fn pause(&self) {
        if self.delay > Duration::from_millis(0) {
            task::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl TodoRepository for MemoryTodos {
    async fn list_all(&self) -> Result<Vec<Todo>> {
        self.pause().await;
        Ok(self.todos.read().await.clone())
    }

    async fn get_by_id(&self, id: i32) -> Result<Todo> {
        self.pause().await;
        let todos = self.todos.read().await;
        todos
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn create(&self, title: String, status: String) -> Result<Todo> {
        self.pause().await;
        let mut next_id = self.next_id.write().await;
        *next_id += 1;
        let todo = Todo {
            id: *next_id,
            title,
            status,
        };
        self.todos.write().await.push(todo.clone());
        Ok(todo)
    }

    async fn update_full(&self, id: i32, title: String, status: String) -> Result<Todo> {
        self.pause().await;
        let mut todos = self.todos.write().await;
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound)?;
        todo.title = title;
        todo.status = status;
        Ok(todo.clone())
    }

    async fn update_status(&self, id: i32, status: String) -> Result<()> {
        self.pause().await;
        let mut todos = self.todos.write().await;
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound)?;
        todo.status = status;
        Ok(())
    }

    async fn update_title(&self, id: i32, title: String) -> Result<()> {
        self.pause().await;
        let mut todos = self.todos.write().await;
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound)?;
        todo.title = title;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.pause().await;
        let mut todos = self.todos.write().await;
        let before = todos.len();
        todos.retain(|t| t.id != id);
        if todos.len() == before {
            Err(Error::NotFound)
        } else {
            Ok(())
        }
    }
}

/// Fails every call the way an unreachable database would.
pub struct BrokenTodos;

fn unreachable_db<T>() -> Result<T> {
    Err(Error::Database(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl TodoRepository for BrokenTodos {
    async fn list_all(&self) -> Result<Vec<Todo>> {
        unreachable_db()
    }

    async fn get_by_id(&self, _id: i32) -> Result<Todo> {
        unreachable_db()
    }

    async fn create(&self, _title: String, _status: String) -> Result<Todo> {
        unreachable_db()
    }

    async fn update_full(&self, _id: i32, _title: String, _status: String) -> Result<Todo> {
        unreachable_db()
    }

    async fn update_status(&self, _id: i32, _status: String) -> Result<()> {
        unreachable_db()
    }

    async fn update_title(&self, _id: i32, _title: String) -> Result<()> {
        unreachable_db()
    }

    async fn delete(&self, _id: i32) -> Result<()> {
        unreachable_db()
    }
}

/// Sends one request through the app in-process and decodes the JSON reply.
pub async fn call(
    app: &tide::Server<State>,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> tide::Result<(StatusCode, Value)> {
    let url = Url::parse(&format!("http://localhost{}", path))?;
    let mut req = Request::new(method, url);
    if let Some(body) = body {
        req.set_body(body);
    }

    let mut res: Response = app.respond(req).await?;
    let status = res.status();
    let json = res.body_json().await?;
    Ok((status, json))
}
