use anyhow::{Context, Result};
use http_types::headers::HeaderValue;
use structopt::StructOpt;
use tide::{
    security::{CorsMiddleware, Origin},
    utils::After,
    Response, Server,
};

pub mod db;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod signals;
pub mod todos;

pub use error::Error;
pub use handlers::State;
pub use todos::{Todo, TodoRepository, Todos};

/// Every todo route lives under this prefix.
pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, StructOpt)]
pub struct Config {
    #[structopt(long, env = "DATABASE_URL")]
    pub database_url: String,
    #[structopt(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3030")]
    pub listen_addr: String,
    #[structopt(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    pub max_connections: u32,
}

pub fn create_app(todos: impl TodoRepository + 'static) -> Server<State> {
    let mut app = tide::with_state(State::new(todos));

    app.with(
        CorsMiddleware::new()
            .allow_methods(
                "GET, POST, PUT, PATCH, DELETE, OPTIONS"
                    .parse::<HeaderValue>()
                    .expect("could not parse as HTTP header value"),
            )
            .allow_origin(Origin::from("*"))
            .allow_credentials(false),
    );
    app.with(After(error::render));

    app.at("/healthz").get(|_| async { Ok(Response::new(204)) });

    let mut api = app.at(API_PREFIX);
    api.at("/todos")
        .get(handlers::list_todos)
        .post(handlers::create_todo);
    api.at("/todos/:id")
        .get(handlers::get_todo)
        .put(handlers::replace_todo)
        .delete(handlers::delete_todo);
    api.at("/todos/:id/status").patch(handlers::change_status);
    api.at("/todos/:id/title").patch(handlers::change_title);

    app
}

/// Connects, prepares the schema, then serves until a termination signal.
pub async fn run(config: Config) -> Result<()> {
    let pool = db::connect(&config.database_url, config.max_connections).await?;
    db::ensure_schema(&pool).await?;

    let server = lifecycle::Server::bind(config.listen_addr.as_str())
        .await
        .with_context(|| format!("could not listen on {}", config.listen_addr))?;
    let shutdown = signals::termination()?;

    let app = create_app(Todos::new(pool.clone()));
    server.run(app, shutdown).await?;

    db::close(&pool, lifecycle::SHUTDOWN_TIMEOUT).await;

    Ok(())
}
