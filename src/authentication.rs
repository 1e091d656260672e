use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::entities::User;
use crate::error::Error;
use crate::AppState;

/// Name of the session cookie issued on login.
pub const SESSION_COOKIE: &str = "todo_session_key";

#[derive(Debug, Clone, Deserialize)]
pub struct LoginParam {
    pub login_id: String,
    pub password: String,
}

impl LoginParam {
    fn validate(&self) -> bool {
        field_in_range(&self.login_id, 8, 64) && field_in_range(&self.password, 8, 64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserParam {
    pub login_id: String,
    pub password: String,
    pub user_name: String,
}

impl CreateUserParam {
    fn validate(&self) -> bool {
        field_in_range(&self.login_id, 8, 64)
            && field_in_range(&self.password, 8, 64)
            && field_in_range(&self.user_name, 2, 64)
    }
}

fn field_in_range(value: &str, min: usize, max: usize) -> bool {
    let len = value.chars().count();
    min <= len && len <= max
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Myself {
    pub login_id: String,
    pub user_name: String,
}

/// Resolves the session cookie to its user, if any.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Result<Option<User>, Error> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    Ok(db::user_by_session(&state.pool, cookie.value()).await?)
}

fn session_cookie(token: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(param): Json<CreateUserParam>,
) -> Result<StatusCode, Error> {
    if !param.validate() {
        return Ok(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let CreateUserParam {
        login_id,
        password,
        user_name,
    } = param;

    // argon2 hashing is blocking, keep it off the async workers
    let password_hash =
        tokio::task::spawn_blocking(move || password_auth::generate_hash(password)).await?;

    if db::create_user(&state.pool, &login_id, &password_hash, &user_name).await? {
        tracing::info!(%login_id, "user created");
        Ok(StatusCode::NO_CONTENT)
    } else {
        tracing::debug!(%login_id, "signup rejected, login id taken");
        Ok(StatusCode::CONFLICT)
    }
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(param): Json<LoginParam>,
) -> Result<Response, Error> {
    if !param.validate() {
        return Ok(StatusCode::UNPROCESSABLE_ENTITY.into_response());
    }
    let LoginParam { login_id, password } = param;

    // unknown login id and wrong password fall through to the same 401
    let Some(user) = db::user_by_login_id(&state.pool, &login_id).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    // verification is blocking, same as hashing
    let (verified, user_name) = tokio::task::spawn_blocking(move || {
        let verified = password_auth::verify_password(password, &user.password_hash).is_ok();
        (verified, user.user_name)
    })
    .await?;

    if !verified {
        tracing::debug!(%login_id, "login rejected");
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let token = db::rotate_session(&state.pool, &login_id).await?;
    let jar = jar.add(session_cookie(token, state.session_max_age_secs));

    tracing::info!(%login_id, "login accepted");
    Ok((
        jar,
        Json(LoginResponse {
            id: login_id,
            name: user_name,
        }),
    )
        .into_response())
}

/// Clears the session slot for whatever token the cookie carries and expires
/// the cookie. Always answers 204, an anonymous logout is a no-op.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, Error> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        db::clear_session(&state.pool, cookie.value()).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));

    Ok((jar, StatusCode::NO_CONTENT).into_response())
}

pub async fn myself(State(state): State<AppState>, jar: CookieJar) -> Result<Response, Error> {
    match current_user(&state, &jar).await? {
        Some(user) => Ok(Json(Myself {
            login_id: user.login_id,
            user_name: user.user_name,
        })
        .into_response()),
        None => Ok(StatusCode::UNAUTHORIZED.into_response()),
    }
}
