#![allow(non_snake_case)]

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

pub fn Fine<V>(v: V) -> Success<V>
where
    V: Serialize,
{
    Success::of(v)
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

/// Message-only success body, e.g. `{"success": true, "message": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound {
        message: String,
    },
    InvalidPayload {
        message: String,
    },
    AttendanceConflict {
        message: String,
        class_name: String,
        date: String,
    },
    InternalError {
        kind: &'static str,
        message: String,
        #[serde(skip)]
        detail: String,
    },
}

impl Error {
    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn conflict(class_name: &str, date: &str) -> Error {
        Error::AttendanceConflict {
            message: format!(
                "Attendance for class `{}` on {} is already recorded; resubmit with `replace: true` to overwrite it",
                class_name, date
            ),
            class_name: class_name.to_string(),
            date: date.to_string(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &'static str, detail: S) -> Error {
        Error::InternalError {
            kind,
            message: "An internal error occurred, please try again later".to_string(),
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::AttendanceConflict { .. } => StatusCode::CONFLICT,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::InternalError { kind, detail, .. } = &self {
            log::error!("{}: {}", kind, detail);
        }
        (self.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound { message }
            | Error::InvalidPayload { message }
            | Error::AttendanceConflict { message, .. } => f.write_str(message),
            Error::InternalError { kind, detail, .. } => write!(f, "{}: {}", kind, detail),
        }
    }
}

impl std::error::Error for Error {}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::internal("DatabaseError", err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::internal("ReportError", err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("Unknown", err.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(format!("Malformed request body: {}", rejection))
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::invalid(format!("Invalid path parameter: {}", rejection))
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(format!("Invalid query string: {}", rejection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_detail_from_clients() {
        let err = Error::internal("DatabaseError", "disk I/O error at page 42");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["error"], "InternalError");
        assert_eq!(body["kind"], "DatabaseError");
        assert!(!body.to_string().contains("page 42"));
    }

    #[test]
    fn conflict_carries_the_batch_key() {
        let err = Error::conflict("5A", "2024-03-01");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["error"], "AttendanceConflict");
        assert_eq!(body["class_name"], "5A");
        assert_eq!(body["date"], "2024-03-01");
    }

    #[test]
    fn success_flattens_its_value() {
        let body = serde_json::to_value(Fine(Message::new("ok"))).unwrap();
        assert_eq!(body, serde_json::json!({ "success": true, "message": "ok" }));
    }
}
