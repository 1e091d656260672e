//! Data access layer. All SQL lives here; handlers go through these
//! functions and never touch the pool directly.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::entities::{DoneFlag, Task, User};

/// Timestamp format used on the wire and in the `update_time` column.
/// Lexicographic order matches chronological order.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/0_users.sql"),
    include_str!("../migrations/1_tasks.sql"),
];

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for migration in MIGRATIONS {
        sqlx::query(migration).execute(pool).await?;
    }
    Ok(())
}

fn now_stamp() -> String {
    Utc::now().format(TIME_FORMAT).to_string()
}

/// Creates the user, returning `false` when the login id is already taken.
/// The existing row is left untouched in that case.
pub async fn create_user(
    pool: &SqlitePool,
    login_id: &str,
    password_hash: &str,
    user_name: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("insert into users (login_id, password_hash, user_name) values (?, ?, ?)")
            .bind(login_id)
            .bind(password_hash)
            .bind(user_name)
            .execute(pool)
            .await;

    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(false),
        Err(err) => Err(err),
    }
}

pub async fn user_by_login_id(
    pool: &SqlitePool,
    login_id: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("select * from users where login_id = ?")
        .bind(login_id)
        .fetch_optional(pool)
        .await
}

/// Mints a fresh session token for the user, displacing any previous one.
/// The old token stops resolving the moment this commits.
pub async fn rotate_session(pool: &SqlitePool, login_id: &str) -> Result<String, sqlx::Error> {
    let token = Uuid::new_v4().to_string();
    sqlx::query("update users set session_token = ? where login_id = ?")
        .bind(&token)
        .bind(login_id)
        .execute(pool)
        .await?;
    Ok(token)
}

pub async fn clear_session(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("update users set session_token = null where session_token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolves a session token to its user. The column is UNIQUE, so a token
/// identifies at most one user.
pub async fn user_by_session(pool: &SqlitePool, token: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("select * from users where session_token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await
}

pub async fn list_tasks(pool: &SqlitePool, login_id: &str) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as(
        "select task_id, content, done_flg, update_time from tasks \
         where login_id = ? order by task_id",
    )
    .bind(login_id)
    .fetch_all(pool)
    .await
}

/// Appends a task for the user. The id is assigned as max existing id + 1
/// (1 for an empty list) inside a transaction, so two concurrent creates
/// cannot mint the same id.
pub async fn create_task(
    pool: &SqlitePool,
    login_id: &str,
    content: &str,
) -> Result<Task, sqlx::Error> {
    let update_time = now_stamp();
    let mut tx = pool.begin().await?;

    let (task_id,): (i64,) =
        sqlx::query_as("select coalesce(max(task_id), 0) + 1 from tasks where login_id = ?")
            .bind(login_id)
            .fetch_one(&mut *tx)
            .await?;

    sqlx::query(
        "insert into tasks (login_id, task_id, content, done_flg, update_time) \
         values (?, ?, ?, ?, ?)",
    )
    .bind(login_id)
    .bind(task_id)
    .bind(content)
    .bind(DoneFlag::Open)
    .bind(&update_time)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Task {
        task_id,
        content: content.to_owned(),
        done_flg: DoneFlag::Open,
        update_time,
    })
}

/// Overwrites whatever fields are present and restamps the row. Returns the
/// new timestamp, or `None` when the task does not exist for this owner;
/// nothing is mutated in that case.
pub async fn update_task(
    pool: &SqlitePool,
    login_id: &str,
    task_id: i64,
    content: Option<&str>,
    done_flg: Option<DoneFlag>,
) -> Result<Option<String>, sqlx::Error> {
    let update_time = now_stamp();
    let result = sqlx::query(
        "update tasks set content = coalesce(?, content), \
         done_flg = coalesce(?, done_flg), update_time = ? \
         where login_id = ? and task_id = ?",
    )
    .bind(content)
    .bind(done_flg)
    .bind(&update_time)
    .bind(login_id)
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok((result.rows_affected() > 0).then_some(update_time))
}

/// Removes the task, returning whether a row was actually deleted.
pub async fn delete_task(
    pool: &SqlitePool,
    login_id: &str,
    task_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("delete from tasks where login_id = ? and task_id = ?")
        .bind(login_id)
        .bind(task_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
