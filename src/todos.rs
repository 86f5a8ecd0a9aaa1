use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Todo {
    pub id: i32,
    pub title: String,
    pub status: String,
}

impl<'r> FromRow<'r, PgRow> for Todo {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Todo {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            status: row.try_get("status")?,
        })
    }
}

/// Storage for todos, shared by every request.
///
/// Each operation touches at most one row and runs as a single statement.
/// Operations addressed by id fail with [`Error::NotFound`] when no row matches.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// All todos in id order.
    async fn list_all(&self) -> Result<Vec<Todo>>;

    async fn get_by_id(&self, id: i32) -> Result<Todo>;

    /// Inserts a todo; the id comes from the database.
    async fn create(&self, title: String, status: String) -> Result<Todo>;

    /// Replaces both title and status.
    async fn update_full(&self, id: i32, title: String, status: String) -> Result<Todo>;

    async fn update_status(&self, id: i32, status: String) -> Result<()>;

    async fn update_title(&self, id: i32, title: String) -> Result<()>;

    async fn delete(&self, id: i32) -> Result<()>;
}

/// Postgres backed [`TodoRepository`].
#[derive(Clone)]
pub struct Todos {
    pool: PgPool,
}

impl Todos {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn one_row_affected(rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(Error::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl TodoRepository for Todos {
    async fn list_all(&self) -> Result<Vec<Todo>> {
        let todos = sqlx::query_as::<_, Todo>("SELECT id, title, status FROM todos ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(todos)
    }

    async fn get_by_id(&self, id: i32) -> Result<Todo> {
        let todo = sqlx::query_as::<_, Todo>("SELECT id, title, status FROM todos WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(todo)
    }

    async fn create(&self, title: String, status: String) -> Result<Todo> {
        let todo = sqlx::query_as::<_, Todo>(
            "INSERT INTO todos (title, status) VALUES ($1, $2) RETURNING id, title, status",
        )
        .bind(title)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(todo)
    }

    async fn update_full(&self, id: i32, title: String, status: String) -> Result<Todo> {
        let todo = sqlx::query_as::<_, Todo>(
            "UPDATE todos SET title = $2, status = $3 WHERE id = $1 RETURNING id, title, status",
        )
        .bind(id)
        .bind(title)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        todo.ok_or(Error::NotFound)
    }

    async fn update_status(&self, id: i32, status: String) -> Result<()> {
        let done = sqlx::query("UPDATE todos SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        one_row_affected(done.rows_affected())
    }

    async fn update_title(&self, id: i32, title: String) -> Result<()> {
        let done = sqlx::query("UPDATE todos SET title = $2 WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(&self.pool)
            .await?;

        one_row_affected(done.rows_affected())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        one_row_affected(deleted.rows_affected())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(0, false ; "nothing matched")]
    #[test_case(1, true ; "one row")]
    fn affected_rows(count: u64, found: bool) {
        assert_eq!(one_row_affected(count).is_ok(), found);
    }
}
