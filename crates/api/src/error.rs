use hubauth_signin::ServiceError;
use std::error::Error as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Server responded with {status}: {status_text}")]
    Status { status: u16, status_text: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(status: reqwest::StatusCode) -> Self {
        ApiError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// True when the request never left because the host name did not resolve.
    pub fn is_host_not_found(&self) -> bool {
        let ApiError::Network(e) = self else {
            return false;
        };
        if !e.is_connect() {
            return false;
        }
        let mut source = e.source();
        while let Some(cause) = source {
            let msg = cause.to_string().to_lowercase();
            if msg.contains("dns error")
                || msg.contains("failed to lookup address")
                || msg.contains("name or service not known")
                || msg.contains("no such host")
            {
                return true;
            }
            source = cause.source();
        }
        false
    }
}

impl From<ApiError> for ServiceError {
    fn from(error: ApiError) -> Self {
        if error.is_host_not_found() {
            let host = match &error {
                ApiError::Network(e) => e
                    .url()
                    .and_then(|u| u.host_str())
                    .unwrap_or("unknown host")
                    .to_string(),
                _ => "unknown host".to_string(),
            };
            return ServiceError::HostNotFound(host);
        }
        match error {
            ApiError::Network(e) if e.is_timeout() => ServiceError::Timeout(e.to_string()),
            ApiError::Network(e) if e.is_decode() => ServiceError::Decode(e.to_string()),
            ApiError::Network(e) => ServiceError::Network(e.to_string()),
            ApiError::Decode(e) => ServiceError::Decode(e.to_string()),
            ApiError::Status {
                status,
                status_text,
            } => ServiceError::Status {
                status,
                status_text,
            },
            ApiError::Api(msg) => ServiceError::Decode(msg),
            ApiError::Io(e) => ServiceError::Browser(e.to_string()),
        }
    }
}
