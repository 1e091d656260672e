use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Storage and runtime faults. Everything the client can act on (bad
/// credentials, duplicate signup, missing task) is expressed as a plain
/// status code at the handler level; these all surface as a bare 500.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
