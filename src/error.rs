use serde_json::json;
use thiserror::Error;
use tide::{log::error, Response, StatusCode};

pub type Result<T> = std::result::Result<T, Error>;

/// Failures a request can run into once it reaches a handler.
#[derive(Error, Debug)]
pub enum Error {
    /// The request body or path could not be decoded into the expected shape.
    #[error("{0}")]
    Validation(String),

    #[error("todo not found")]
    NotFound,

    /// The database was unreachable or the statement failed.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BadRequest,
            Error::NotFound => StatusCode::NotFound,
            Error::Database(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound,
            e => Error::Database(e),
        }
    }
}

/// Turns any failed response into `{"error": <message>}` with the matching status.
///
/// Runs after every endpoint. Handler errors arrive here as a `tide::Error`
/// wrapping [`Error`]; anything else keeps the status tide gave it.
pub async fn render(mut response: Response) -> tide::Result {
    let failure = if let Some(e) = response.downcast_error::<Error>() {
        Some((e.status(), e.to_string()))
    } else if let Some(e) = response.error() {
        Some((e.status(), e.to_string()))
    } else if response.status().is_client_error() || response.status().is_server_error() {
        let status = response.status();
        Some((status, status.canonical_reason().to_string()))
    } else {
        None
    };

    if let Some((status, message)) = failure {
        if status.is_server_error() {
            error!("request failed: {}", message);
        }
        response.set_status(status);
        response.set_body(json!({ "error": message }));
    }

    Ok(response)
}
