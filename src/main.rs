use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use clap::Parser;
use color_eyre::eyre::{ensure, WrapErr};
use color_eyre::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, LogFormat};
use crate::opt::Opt;

mod authentication;
mod config;
mod crud_ops;
mod db;
mod entities;
mod error;
mod opt;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub session_max_age_secs: i64,
}

/// Initializes tracing collection
fn setup_tracing(config: config::Logging) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    let filter_layer = config
        .filters
        .into_iter()
        .fold(filter_layer, |layer, filter| layer.add_directive(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn app(config: &Config, state: AppState) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(format!("http://{}", config.host).parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_credentials(true)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    let router = Router::new()
        .route("/login", post(authentication::login))
        .route("/logout", post(authentication::logout))
        .route("/createUser", post(authentication::create_user))
        .route("/myself", get(authentication::myself))
        .route("/tasks", get(crud_ops::get_tasks).post(crud_ops::create_task))
        .route(
            "/tasks/{task_id}",
            put(crud_ops::update_task).delete(crud_ops::delete_task),
        )
        .route_service(
            "/signup",
            ServeFile::new(config.static_dir.join("signUp.html")),
        )
        .route_service(
            "/todos",
            ServeFile::new(config.static_dir.join("todos.html")),
        )
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(router)
}

async fn run_server(config: Config) -> Result<()> {
    ensure!(
        config.static_dir.is_dir(),
        "static directory {:?} does not exist",
        config.static_dir
    );

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .wrap_err("opening database")?;
    db::migrate(&pool).await?;

    let state = AppState {
        pool,
        session_max_age_secs: config.session_max_age_secs,
    };
    let router = app(&config, state)?;

    let listener = TcpListener::bind(config.host).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::parse();
    let config = config::load(&opt.config)?;
    setup_tracing(config.logging.clone());

    info!(config = ?opt.config, "starting todo service");
    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    // In-memory sqlite lives per connection, keep the pool at one.
    async fn spawn_server() -> String {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();

        let state = AppState {
            pool,
            session_max_age_secs: 28800,
        };
        let router = app(&Config::default(), state).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn signup_login_task_roundtrip() {
        let base = spawn_server().await;
        let client = client();

        // signup
        let resp = client
            .post(format!("{base}/createUser"))
            .json(&json!({
                "login_id": "alice0001",
                "password": "password1",
                "user_name": "Alice"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        // duplicate login id is rejected
        let resp = client
            .post(format!("{base}/createUser"))
            .json(&json!({
                "login_id": "alice0001",
                "password": "different1",
                "user_name": "Mallory"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);

        // field constraints from the signup form
        let resp = client
            .post(format!("{base}/createUser"))
            .json(&json!({
                "login_id": "bob00001x",
                "password": "short",
                "user_name": "Bob"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        // wrong password
        let resp = client
            .post(format!("{base}/login"))
            .json(&json!({ "login_id": "alice0001", "password": "password2" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        // no session yet
        let resp = client.get(format!("{base}/myself")).send().await.unwrap();
        assert_eq!(resp.status(), 401);
        let resp = client.get(format!("{base}/tasks")).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        // correct password sets the session cookie
        let resp = client
            .post(format!("{base}/login"))
            .json(&json!({ "login_id": "alice0001", "password": "password1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "alice0001");
        assert_eq!(body["name"], "Alice");

        let resp = client.get(format!("{base}/myself")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["login_id"], "alice0001");
        assert_eq!(body["user_name"], "Alice");

        // empty list comes with an empty timestamp
        let body: Value = client
            .get(format!("{base}/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["tasks"], json!([]));
        assert_eq!(body["update_time"], "");

        // first task gets id 1 and an open done flag
        let resp = client
            .post(format!("{base}/tasks"))
            .json(&json!({ "content": "buy milk" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], 1);

        let body: Value = client
            .get(format!("{base}/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["tasks"][0]["id"], 1);
        assert_eq!(body["tasks"][0]["content"], "buy milk");
        assert_eq!(body["tasks"][0]["done_flg"], "0");
        assert_eq!(body["update_time"], body["tasks"][0]["update_time"]);

        // mark it done
        let resp = client
            .put(format!("{base}/tasks/1"))
            .json(&json!({ "done_flg": "1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = client
            .get(format!("{base}/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["tasks"][0]["content"], "buy milk");
        assert_eq!(body["tasks"][0]["done_flg"], "1");

        // unknown task id
        let resp = client
            .put(format!("{base}/tasks/99"))
            .json(&json!({ "done_flg": "1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        // delete it, twice
        let resp = client
            .delete(format!("{base}/tasks/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let resp = client
            .delete(format!("{base}/tasks/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let body: Value = client
            .get(format!("{base}/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["tasks"], json!([]));
        assert_eq!(body["update_time"], "");

        // logout drops the session
        let resp = client.post(format!("{base}/logout")).send().await.unwrap();
        assert_eq!(resp.status(), 204);
        let resp = client.get(format!("{base}/myself")).send().await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn second_login_displaces_the_first_session() {
        let base = spawn_server().await;

        let first = client();
        let second = client();

        first
            .post(format!("{base}/createUser"))
            .json(&json!({
                "login_id": "alice0001",
                "password": "password1",
                "user_name": "Alice"
            }))
            .send()
            .await
            .unwrap();

        let credentials = json!({ "login_id": "alice0001", "password": "password1" });
        let resp = first
            .post(format!("{base}/login"))
            .json(&credentials)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = second
            .post(format!("{base}/login"))
            .json(&credentials)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        // the session slot is single occupancy
        let resp = first.get(format!("{base}/myself")).send().await.unwrap();
        assert_eq!(resp.status(), 401);
        let resp = second.get(format!("{base}/myself")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn tasks_are_invisible_across_users() {
        let base = spawn_server().await;

        let alice = client();
        let bob = client();

        for (who, id, name) in [
            (&alice, "alice0001", "Alice"),
            (&bob, "bob00001x", "Bob"),
        ] {
            who.post(format!("{base}/createUser"))
                .json(&json!({ "login_id": id, "password": "password1", "user_name": name }))
                .send()
                .await
                .unwrap();
            who.post(format!("{base}/login"))
                .json(&json!({ "login_id": id, "password": "password1" }))
                .send()
                .await
                .unwrap();
        }

        alice
            .post(format!("{base}/tasks"))
            .json(&json!({ "content": "alice only" }))
            .send()
            .await
            .unwrap();

        let body: Value = bob
            .get(format!("{base}/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["tasks"], json!([]));

        // bob cannot touch alice's task
        let resp = bob
            .put(format!("{base}/tasks/1"))
            .json(&json!({ "content": "stolen" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let resp = bob.delete(format!("{base}/tasks/1")).send().await.unwrap();
        assert_eq!(resp.status(), 404);

        let body: Value = alice
            .get(format!("{base}/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["tasks"][0]["content"], "alice only");
    }

    #[tokio::test]
    async fn static_pages_are_served() {
        let base = spawn_server().await;
        let client = client();

        for path in ["/signup", "/todos", "/"] {
            let resp = client.get(format!("{base}{path}")).send().await.unwrap();
            assert_eq!(resp.status(), 200, "GET {path}");
            let body = resp.text().await.unwrap();
            assert!(body.contains("<html"), "GET {path} should serve HTML");
        }
    }
}
