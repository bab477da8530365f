use application::ApplicationError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_owned(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "message not found")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Authentication => ApiError::unauthorized("not authorized"),
            ApplicationError::Validation { field, reason } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("{field}: {reason}"),
            ),
            ApplicationError::NotFound => ApiError::not_found(),
            // 细节已在应用层记录，不返回给客户端
            ApplicationError::Store(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "storage failure",
            ),
        }
    }
}

// 请求体无法解析时沿用统一的错误结构
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "INVALID_BODY", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::RepositoryError;

    #[test]
    fn application_errors_map_to_status_codes() {
        let cases = [
            (ApplicationError::Authentication, StatusCode::UNAUTHORIZED),
            (
                ApplicationError::validation("content", "cannot be empty"),
                StatusCode::BAD_REQUEST,
            ),
            (ApplicationError::NotFound, StatusCode::NOT_FOUND),
            (
                ApplicationError::Store(RepositoryError::storage("pool timed out")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn store_detail_is_not_exposed() {
        let err = ApiError::from(ApplicationError::Store(RepositoryError::storage(
            "password authentication failed for user postgres",
        )));
        assert_eq!(err.body.message, "storage failure");
        assert_eq!(err.body.code, "STORE_ERROR");
    }
}
