use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::assessment::{
    AssessError, FormError, PersistenceError, StorageError, TransportError,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Form(FormError),
    Transport(TransportError),
    Session(PersistenceError),
    Csv(csv::Error),
    Assess(AssessError),
    /// The scoring round finished but produced an error instead of a prediction.
    AssessmentFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Form(err) => write!(f, "invalid assessment input: {}", err),
            AppError::Transport(err) => write!(f, "scoring service error: {}", err),
            AppError::Session(err) => write!(f, "session error: {}", err),
            AppError::Csv(err) => write!(f, "csv error: {}", err),
            AppError::Assess(err) => write!(f, "assessment not started: {}", err),
            AppError::AssessmentFailed(message) => write!(f, "assessment failed: {}", message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Form(err) => Some(err),
            AppError::Transport(err) => Some(err),
            AppError::Session(err) => Some(err),
            AppError::Csv(err) => Some(err),
            AppError::Assess(err) => Some(err),
            AppError::AssessmentFailed(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Form(_) | AppError::Csv(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transport(_) | AppError::AssessmentFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Assess(_) => StatusCode::CONFLICT,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<FormError> for AppError {
    fn from(value: FormError) -> Self {
        Self::Form(value)
    }
}

impl From<TransportError> for AppError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<PersistenceError> for AppError {
    fn from(value: PersistenceError) -> Self {
        Self::Session(value)
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        Self::Session(PersistenceError::from(value))
    }
}

impl From<AssessError> for AppError {
    fn from(value: AssessError) -> Self {
        Self::Assess(value)
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}
