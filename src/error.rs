/// Gateway-wide error type.
///
/// Malformed backend payloads and delta events whose call id cannot be
/// resolved never become a `GatewayError`; the transcoder drops them.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map a backend HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            GatewayError::Auth(_) => ErrorCategory::Authentication,
            GatewayError::Config(_) | GatewayError::Transport(_) | GatewayError::Internal(_) => {
                ErrorCategory::ServerError
            }
            GatewayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::Permission => "permission_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

fn openai_error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::Authentication => "invalid_api_key",
        ErrorCategory::Permission => "permission_denied",
        ErrorCategory::RateLimit => "rate_limit_exceeded",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

/// Format an error as a Chat Completions error body, returning
/// (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": openai_error_type(cat),
            "code": openai_error_code(cat),
            "param": null,
        }
    });
    (status, body)
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}
