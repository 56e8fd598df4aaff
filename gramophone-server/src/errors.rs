use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gramophone_collab::{AuthError, InputError, RoomError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    BadRequest(String),
    #[error("Upstream service is unavailable: {0}")]
    Upstream(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { resource: _ } => StatusCode::NOT_FOUND,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::RoomNotFound => Self::NotFound { resource: "Room" },
            e => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Upstream(e) => Self::Upstream(e),
        }
    }
}

impl From<InputError> for ServerError {
    fn from(value: InputError) -> Self {
        match value {
            InputError::ResolutionFailed => Self::NotFound { resource: "Track" },
            InputError::Unavailable(e) => Self::Upstream(e),
            e => Self::BadRequest(e.to_string()),
        }
    }
}
