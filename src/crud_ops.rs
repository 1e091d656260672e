use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::authentication::current_user;
use crate::db;
use crate::entities::{DoneFlag, Task};
use crate::error::Error;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    /// Most recent `update_time` across the list, empty when there are no
    /// tasks.
    pub update_time: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskParam {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskParam {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub done_flg: Option<DoneFlag>,
}

#[derive(Debug, Serialize)]
pub struct TaskStamp {
    pub id: i64,
    pub update_time: String,
}

pub async fn get_tasks(State(state): State<AppState>, jar: CookieJar) -> Result<Response, Error> {
    let Some(user) = current_user(&state, &jar).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    let tasks = db::list_tasks(&state.pool, &user.login_id).await?;
    let update_time = tasks
        .iter()
        .map(|task| task.update_time.as_str())
        .max()
        .unwrap_or("")
        .to_owned();

    Ok(Json(TaskList { tasks, update_time }).into_response())
}

pub async fn create_task(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(param): Json<CreateTaskParam>,
) -> Result<Response, Error> {
    let Some(user) = current_user(&state, &jar).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    let task = db::create_task(&state.pool, &user.login_id, &param.content).await?;
    tracing::debug!(login_id = %user.login_id, task_id = task.task_id, "task created");

    Ok((
        StatusCode::CREATED,
        Json(TaskStamp {
            id: task.task_id,
            update_time: task.update_time,
        }),
    )
        .into_response())
}

pub async fn update_task(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(task_id): Path<i64>,
    Json(param): Json<UpdateTaskParam>,
) -> Result<Response, Error> {
    let Some(user) = current_user(&state, &jar).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    let updated = db::update_task(
        &state.pool,
        &user.login_id,
        task_id,
        param.content.as_deref(),
        param.done_flg,
    )
    .await?;

    match updated {
        Some(update_time) => Ok(Json(TaskStamp {
            id: task_id,
            update_time,
        })
        .into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

pub async fn delete_task(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(task_id): Path<i64>,
) -> Result<Response, Error> {
    let Some(user) = current_user(&state, &jar).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    if db::delete_task(&state.pool, &user.login_id, task_id).await? {
        Ok(StatusCode::OK.into_response())
    } else {
        Ok(StatusCode::NOT_FOUND.into_response())
    }
}
