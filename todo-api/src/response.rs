/// Response envelope and result codes
///
/// Every endpoint answers with `{"code": .., "msg": .., "data": ..}`.
/// Success is always code 0; failures carry one of the [`ResultCode`]s
/// below alongside a matching HTTP status (see `error.rs`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Application result codes carried in the envelope's `code` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Unauthorized,
    UnknownError,
    NeedPermission,
    TargetNotFound,
    CommonError,
    DataFormatError,
    ParameterValidationError,
    TooFrequent,
}

impl ResultCode {
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::Unauthorized => 401,
            ResultCode::UnknownError => 999,
            ResultCode::NeedPermission => 1000,
            ResultCode::TargetNotFound => 1006,
            ResultCode::CommonError => 1017,
            ResultCode::DataFormatError => 1018,
            ResultCode::ParameterValidationError => 1029,
            ResultCode::TooFrequent => 1030,
        }
    }

    /// Default message when the error carries none of its own
    pub fn message(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::Unauthorized => "Unauthorized",
            ResultCode::UnknownError => "Unknown error",
            ResultCode::NeedPermission => "Permission required",
            ResultCode::TargetNotFound => "Target not found",
            ResultCode::CommonError => "System error",
            ResultCode::DataFormatError => "Invalid request data format",
            ResultCode::ParameterValidationError => "Parameter validation failed",
            ResultCode::TooFrequent => "Too frequent access.",
        }
    }
}

/// Success envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: ResultCode::Ok.code(),
            msg: ResultCode::Ok.message().to_string(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_codes() {
        assert_eq!(ResultCode::Ok.code(), 0);
        assert_eq!(ResultCode::Unauthorized.code(), 401);
        assert_eq!(ResultCode::TargetNotFound.code(), 1006);
        assert_eq!(ResultCode::DataFormatError.code(), 1018);
        assert_eq!(ResultCode::ParameterValidationError.code(), 1029);
        assert_eq!(ResultCode::TooFrequent.code(), 1030);
    }

    #[test]
    fn test_ok_envelope() {
        let body = serde_json::to_value(ApiResponse::ok(json!({"id": 1}))).unwrap();

        assert_eq!(body, json!({"code": 0, "msg": "ok", "data": {"id": 1}}));
    }

    #[test]
    fn test_ok_response_status() {
        let response = ApiResponse::ok(vec![1, 2]).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
