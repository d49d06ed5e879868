//! [`AppError`]: maps the store's closed error taxonomy onto the HTTP
//! envelope's `slug` field.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use nimbus_db::StoreError;

use super::dto::Envelope;

pub struct AppError {
    pub status: StatusCode,
    pub slug: &'static str,
    pub message: String,
}

impl AppError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            slug: "invalid-input",
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            slug: "not-found",
            message: msg.into(),
        }
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            slug: "server-error",
            message: msg.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::not_found(e.to_string()),
            StoreError::Conflict(_) | StoreError::Validation(_) => Self::invalid_input(e.to_string()),
            StoreError::Storage(_) => Self::server_error(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body: Envelope<()> = Envelope {
            slug: self.slug,
            error: self.message,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}
