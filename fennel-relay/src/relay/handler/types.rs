use crate::relay::engine::RelayError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// 错误类型枚举，用于确定HTTP状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// 客户端错误 - 400 Bad Request
    BadRequest,
    /// 调用方断开 - 499
    ClientClosedRequest,
    /// 服务器内部错误 - 500 Internal Server Error
    InternalServerError,
    /// 服务不可用 - 503 Service Unavailable
    ServiceUnavailable,
}

impl ErrorType {
    /// 获取对应的HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::ClientClosedRequest => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "invalid_request_error",
            ErrorType::ClientClosedRequest => "client_closed_request",
            ErrorType::InternalServerError => "internal_error",
            ErrorType::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl From<&RelayError> for ErrorType {
    fn from(error: &RelayError) -> Self {
        match error {
            RelayError::AllAttemptsExhausted { .. } => ErrorType::ServiceUnavailable,
            RelayError::InvalidRequest(_) => ErrorType::BadRequest,
            RelayError::Cancelled => ErrorType::ClientClosedRequest,
        }
    }
}

/// 创建错误响应
pub fn create_error_response(
    error_type: ErrorType,
    message: &str,
    details: Option<String>,
) -> axum::response::Response {
    let status = error_type.status_code();
    let body = json!({
        "error": {
            "message": message,
            "type": error_type.as_str(),
            "code": status.as_u16(),
            "details": details,
        }
    });
    (status, Json(body)).into_response()
}

/// 转发错误转换为HTTP响应，服务端细节不透出给调用方
pub fn relay_error_response(error: &RelayError) -> axum::response::Response {
    let error_type = ErrorType::from(error);
    match error {
        RelayError::InvalidRequest(reason) => {
            create_error_response(error_type, "invalid request", Some(reason.clone()))
        }
        other => create_error_response(error_type, &other.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_status_codes() {
        let exhausted = RelayError::AllAttemptsExhausted {
            model: "gpt-4".to_string(),
            attempts: 3,
        };
        assert_eq!(
            ErrorType::from(&exhausted).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorType::from(&RelayError::InvalidRequest("x".to_string())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorType::from(&RelayError::Cancelled).status_code().as_u16(),
            499
        );
    }

    #[test]
    fn test_exhausted_message_is_generic() {
        let exhausted = RelayError::AllAttemptsExhausted {
            model: "gpt-4".to_string(),
            attempts: 3,
        };
        assert_eq!(exhausted.to_string(), "no provider available, try again later");
        let response = relay_error_response(&exhausted);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
