use async_trait::async_trait;

use crate::error::ServiceError;
use crate::types::{Account, AuthorizationOutcome, ServerMetadata};

/// Network side of the sign-in flow.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn create_authorization(
        &self,
        endpoint: &str,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<AuthorizationOutcome, ServiceError>;

    async fn fetch_user(&self, endpoint: &str, token: &str) -> Result<Account, ServiceError>;

    async fn fetch_metadata(&self, endpoint: &str) -> Result<ServerMetadata, ServiceError>;
}

/// Browser-delegated OAuth sign-in.
///
/// Implementations resolve once the user has completed the handshake. An
/// abandoned browser session leaves the future pending.
#[async_trait]
pub trait BrowserAuthenticator: Send + Sync {
    async fn authenticate(&self, endpoint: &str) -> Result<Account, ServiceError>;
}
