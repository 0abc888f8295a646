//! Scripted collaborators for store and cache tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::error::ServiceError;
use crate::service::{AuthorizationService, BrowserAuthenticator};
use crate::types::{Account, AuthorizationOutcome, ServerMetadata};

pub(crate) enum Reply<T> {
    Ready(Result<T, ServiceError>),
    Gated(oneshot::Receiver<Result<T, ServiceError>>),
    Pending,
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T, ServiceError> {
        match self {
            Reply::Ready(result) => result,
            Reply::Gated(rx) => match rx.await {
                Ok(result) => result,
                Err(_) => std::future::pending().await,
            },
            Reply::Pending => std::future::pending().await,
        }
    }
}

/// Returns a reply that resolves when the sender fires.
pub(crate) fn gate<T>() -> (oneshot::Sender<Result<T, ServiceError>>, Reply<T>) {
    let (tx, rx) = oneshot::channel();
    (tx, Reply::Gated(rx))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthorizationCall {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub otp: Option<String>,
}

#[derive(Default)]
pub(crate) struct FakeAuthorization {
    outcomes: Mutex<VecDeque<Reply<AuthorizationOutcome>>>,
    users: Mutex<VecDeque<Reply<Account>>>,
    metadata: Mutex<VecDeque<Reply<ServerMetadata>>>,
    pub calls: Mutex<Vec<AuthorizationCall>>,
    pub user_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
}

impl FakeAuthorization {
    pub fn outcome(&self, reply: Reply<AuthorizationOutcome>) -> &Self {
        self.outcomes.lock().unwrap().push_back(reply);
        self
    }

    pub fn user(&self, reply: Reply<Account>) -> &Self {
        self.users.lock().unwrap().push_back(reply);
        self
    }

    pub fn metadata(&self, reply: Reply<ServerMetadata>) -> &Self {
        self.metadata.lock().unwrap().push_back(reply);
        self
    }

    pub fn supports_basic_auth(&self, supported: bool) -> &Self {
        self.metadata(Reply::Ready(Ok(ServerMetadata {
            supports_basic_auth: supported,
        })))
    }

    pub fn recorded_calls(&self) -> Vec<AuthorizationCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn next<T>(queue: &Mutex<VecDeque<Reply<T>>>) -> Reply<T> {
    queue.lock().unwrap().pop_front().unwrap_or(Reply::Pending)
}

#[async_trait]
impl AuthorizationService for FakeAuthorization {
    async fn create_authorization(
        &self,
        endpoint: &str,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<AuthorizationOutcome, ServiceError> {
        self.calls.lock().unwrap().push(AuthorizationCall {
            endpoint: endpoint.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            otp: otp.map(String::from),
        });
        let reply = next(&self.outcomes);
        reply.resolve().await
    }

    async fn fetch_user(&self, _endpoint: &str, _token: &str) -> Result<Account, ServiceError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        let reply = next(&self.users);
        reply.resolve().await
    }

    async fn fetch_metadata(&self, _endpoint: &str) -> Result<ServerMetadata, ServiceError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let reply = next(&self.metadata);
        reply.resolve().await
    }
}

#[derive(Default)]
pub(crate) struct FakeBrowser {
    replies: Mutex<VecDeque<Reply<Account>>>,
    pub calls: AtomicUsize,
}

impl FakeBrowser {
    pub fn reply(&self, reply: Reply<Account>) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

#[async_trait]
impl BrowserAuthenticator for FakeBrowser {
    async fn authenticate(&self, _endpoint: &str) -> Result<Account, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = next(&self.replies);
        reply.resolve().await
    }
}

pub(crate) fn account(login: &str, endpoint: &str) -> Account {
    Account {
        login: login.to_string(),
        id: 42,
        name: Some("Mona Lisa".to_string()),
        email: None,
        avatar_url: None,
        endpoint: endpoint.to_string(),
        token: "gho_secret".to_string(),
    }
}
