pub mod client;
pub mod error;
pub mod oauth;

pub use client::{classify_authorization, GitHubApi, HttpSettings, OAuthApp};
pub use error::{ApiError, ApiResult};
pub use oauth::BrowserFlow;
