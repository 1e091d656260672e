use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Completion marker, encoded as `"0"`/`"1"` both on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum DoneFlag {
    #[serde(rename = "0")]
    #[sqlx(rename = "0")]
    Open,
    #[serde(rename = "1")]
    #[sqlx(rename = "1")]
    Done,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    #[serde(rename = "id")]
    pub task_id: i64,
    pub content: String,
    pub done_flg: DoneFlag,
    pub update_time: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub login_id: String,
    pub password_hash: String,
    pub user_name: String,
    /// Single-slot session: at most one live token per user, replaced on
    /// every successful login and cleared on logout.
    pub session_token: Option<String>,
}
