use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid messages request: {0}")]
    InvalidRequest(String),

    #[error("Request body too large")]
    BodyTooLarge,

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SSE stream overflow")]
    StreamOverflow,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream timeout: {0}")]
    Timeout(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// The `error.type` string surfaced on the Anthropic wire.
    pub fn client_type(&self) -> &'static str {
        match self {
            GatewayError::RateLimited => "rate_limit_error",
            GatewayError::MissingCredentials(_) | GatewayError::Authentication(_) => {
                "authentication_error"
            }
            _ => "api_error",
        }
    }

    /// The HTTP status paired with the client error body.
    pub fn client_status(&self) -> StatusCode {
        match self {
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            // Could not authorize locally vs. rejected by the upstream.
            GatewayError::MissingCredentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Authentication(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
