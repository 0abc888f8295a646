//! Endpoint derivation and address validation.
//!
//! The store works with API endpoints (`https://api.github.com`,
//! `https://ghe.example.com/api/v3`). Web pages such as the password reset form
//! live under the matching HTML root.

use crate::error::UrlValidationError;
use url::Url;

pub const DEFAULT_HOSTED_ENDPOINT: &str = "https://api.github.com";

const ENTERPRISE_API_PATH: &str = "/api/v3";

pub trait UrlValidator: Send + Sync {
    fn validate(&self, raw: &str) -> Result<Url, UrlValidationError>;
}

/// Accepts bare host names by assuming `https`, rejects anything that is not
/// `http` or `https`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlValidator;

impl UrlValidator for DefaultUrlValidator {
    fn validate(&self, raw: &str) -> Result<Url, UrlValidationError> {
        let raw = raw.trim();
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };

        let url = Url::parse(&candidate).map_err(|_| UrlValidationError::InvalidUrl)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlValidationError::InvalidProtocol);
        }
        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(url),
            _ => Err(UrlValidationError::InvalidUrl),
        }
    }
}

pub fn enterprise_api_endpoint(base: &Url) -> String {
    format!("{}{}", base.origin().ascii_serialization(), ENTERPRISE_API_PATH)
}

/// Web root for an API endpoint: `api.` hosts drop the prefix, enterprise
/// endpoints drop the `/api/v3` path.
pub fn html_root(api_endpoint: &str) -> String {
    let Ok(url) = Url::parse(api_endpoint) else {
        return api_endpoint
            .trim_end_matches('/')
            .trim_end_matches(ENTERPRISE_API_PATH)
            .to_string();
    };

    let origin = url.origin().ascii_serialization();
    let bare_path = url.path().trim_end_matches('/').is_empty();
    match url.host_str() {
        Some(host) if bare_path && host.starts_with("api.") => {
            origin.replacen("://api.", "://", 1)
        }
        _ => origin,
    }
}

pub fn forgot_password_url(api_endpoint: &str) -> String {
    format!("{}/password_reset", html_root(api_endpoint))
}

pub(crate) fn same_endpoint(a: &str, b: &str) -> bool {
    a.trim_end_matches('/').eq_ignore_ascii_case(b.trim_end_matches('/'))
}
