//! HTTP错误映射

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use dental_core::DentalError;
use serde_json::json;

/// 请求边界上的错误包装
#[derive(Debug)]
pub struct ApiError(pub DentalError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DentalError::MissingField(_) | DentalError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DentalError::NotFound(_) => StatusCode::NOT_FOUND,
            DentalError::Analysis(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DentalError> for ApiError {
    fn from(err: DentalError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DentalError::InvalidInput(rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(DentalError::InvalidInput(err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            DentalError::MissingField(field) => format!("Missing required field: {}", field),
            other => other.message(),
        };

        let body = Json(json!({
            "error": true,
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
