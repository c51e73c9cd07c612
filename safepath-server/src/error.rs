use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use safepath_core::Error;
use serde_json::json;
use tracing::error;

/// JSON body extractor whose rejections render as [`ApiError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Handler error rendered as `{"error": kind, "message": ...}`
#[derive(Debug)]
pub enum ApiError {
    Engine(Error),
    /// Unreadable request body; keeps the rejection status
    Body(JsonRejection),
    BadRequest(String),
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Engine(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => match e {
                Error::UnknownMode(_) | Error::InvalidRoute(_) | Error::InvalidData(_) => {
                    StatusCode::BAD_REQUEST
                }
                Error::UnknownNode(_) | Error::UnknownEdge(_) => StatusCode::NOT_FOUND,
                Error::NoPath { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                Error::StaleAggregates(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Body(rejection) => rejection.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => e.kind(),
            ApiError::Body(_) => "invalid_body",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::Body(rejection) => rejection.body_text(),
            ApiError::BadRequest(message) | ApiError::Internal(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "{}", self.message());
        }
        let body = json!({ "error": self.kind(), "message": self.message() });
        (status, Json(body)).into_response()
    }
}
