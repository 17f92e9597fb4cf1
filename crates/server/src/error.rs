use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ingest::IngestError;
use postback::PostbackError;
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("missing required fields")]
    MissingRequiredFields,

    #[error("invalid identifier")]
    InvalidIdentifier,

    #[error("malformed body: {0}")]
    MalformedBody(#[from] IngestError),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("user/model not found")]
    InvalidUserModel,

    #[error("transaction {0:?} already present")]
    Duplicate(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("not found")]
    NotFound,

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::EmptyPayload
            | ServerError::MissingRequiredFields
            | ServerError::InvalidIdentifier
            | ServerError::MalformedBody(_)
            | ServerError::MalformedQuery(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidUserModel | ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Duplicate(_) => StatusCode::CONFLICT,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Internal(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value of the `error` field in the response body
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::EmptyPayload => "empty payload",
            ServerError::MissingRequiredFields => "missing required fields",
            ServerError::InvalidIdentifier => "invalid identifier",
            ServerError::MalformedBody(_) => "malformed body",
            ServerError::MalformedQuery(_) => "malformed query",
            ServerError::InvalidUserModel => "invalid_user_model",
            ServerError::Duplicate(_) => "transaction_exists",
            ServerError::MethodNotAllowed => "method not allowed",
            ServerError::PayloadTooLarge => "payload too large",
            ServerError::NotFound => "not found",
            ServerError::Internal(_) | ServerError::Config(_) => "internal server error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.error_code();

        let body = match &self {
            ServerError::Duplicate(_) => json!({
                "error": error,
                "message": "Transaction ID already present",
            }),
            ServerError::Internal(_) | ServerError::Config(_) => {
                tracing::error!(error = %self, "request_failed");
                json!({ "error": error })
            }
            _ => json!({ "error": error }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PostbackError> for ServerError {
    fn from(err: PostbackError) -> Self {
        match err {
            PostbackError::EmptyPayload => ServerError::EmptyPayload,
            PostbackError::MissingRequiredFields => ServerError::MissingRequiredFields,
            PostbackError::InvalidIdentifier => ServerError::InvalidIdentifier,
            PostbackError::InvalidUserModel => ServerError::InvalidUserModel,
            PostbackError::Duplicate(key) => ServerError::Duplicate(key),
            PostbackError::Store(err) => ServerError::Internal(err.to_string()),
        }
    }
}

impl From<postback::ConfigError> for ServerError {
    fn from(err: postback::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}
