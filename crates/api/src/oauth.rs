//! Browser sign-in through a loopback redirect.
//!
//! The flow listens on `127.0.0.1`, sends the user to the authorize page and
//! waits for the redirect carrying the code. Requests that do not carry the
//! expected `state` are answered and ignored, so an abandoned browser tab
//! leaves the future pending.

use crate::client::GitHubApi;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use hubauth_signin::endpoint::html_root;
use hubauth_signin::{Account, BrowserAuthenticator, ServiceError};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

const CALLBACK_PATH: &str = "/oauth/callback";

const SIGNED_IN_PAGE: &str =
    "<html><body><h1>Signed in</h1><p>You can close this window and return to the terminal.</p></body></html>";
const DENIED_PAGE: &str =
    "<html><body><h1>Sign-in cancelled</h1><p>You can close this window.</p></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    Ignored,
}

#[derive(Clone)]
pub struct BrowserFlow {
    api: GitHubApi,
    redirect_port: u16,
}

impl BrowserFlow {
    /// `redirect_port` 0 picks a free port.
    pub fn new(api: GitHubApi, redirect_port: u16) -> Self {
        Self { api, redirect_port }
    }

    pub fn authorize_url(&self, endpoint: &str, redirect_uri: &str, state: &str) -> ApiResult<Url> {
        let app = self.api.app();
        let scope = app.scopes.join(" ");
        Url::parse_with_params(
            &format!("{}/login/oauth/authorize", html_root(endpoint)),
            &[
                ("client_id", app.client_id.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
                ("redirect_uri", redirect_uri),
            ],
        )
        .map_err(|e| ApiError::Api(format!("Invalid authorize URL: {e}")))
    }

    async fn sign_in(&self, endpoint: &str) -> ApiResult<Account> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port)).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}{CALLBACK_PATH}");
        let state = random_state();

        let url = self.authorize_url(endpoint, &redirect_uri, &state)?;
        info!(port, "Waiting for browser sign-in");
        if let Err(e) = open::that(url.as_str()) {
            warn!("Could not open a browser ({e}); visit {url} to continue");
        }

        let code = wait_for_code(&listener, &state).await?;
        debug!("OAuth callback received, exchanging code");
        let token = self.api.exchange_code(endpoint, &code, &redirect_uri).await?;
        self.api.get_user(endpoint, &token).await
    }
}

#[async_trait]
impl BrowserAuthenticator for BrowserFlow {
    async fn authenticate(&self, endpoint: &str) -> Result<Account, ServiceError> {
        self.sign_in(endpoint).await.map_err(|e| match e {
            ApiError::Io(e) => ServiceError::Browser(format!("OAuth callback listener failed: {e}")),
            ApiError::Api(msg) => ServiceError::Browser(msg),
            other => ServiceError::from(other),
        })
    }
}

async fn wait_for_code(listener: &TcpListener, state: &str) -> ApiResult<String> {
    loop {
        let (stream, peer) = listener.accept().await?;
        match answer_callback(stream, state).await {
            Ok(Callback::Code(code)) => return Ok(code),
            Ok(Callback::Denied(reason)) => {
                return Err(ApiError::Api(format!("Authorization denied: {reason}")))
            }
            Ok(Callback::Ignored) => debug!(%peer, "Ignoring unrelated request on callback port"),
            Err(e) => debug!(%peer, "Callback connection failed: {e}"),
        }
    }
}

async fn answer_callback(mut stream: TcpStream, state: &str) -> std::io::Result<Callback> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        reader.read_line(&mut request_line).await?;
    }

    let callback = parse_callback(&request_line, state);
    let (status, body) = match &callback {
        Callback::Code(_) => ("200 OK", SIGNED_IN_PAGE),
        Callback::Denied(_) => ("200 OK", DENIED_PAGE),
        Callback::Ignored => ("404 Not Found", "Not found"),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    let _ = stream.shutdown().await;
    Ok(callback)
}

/// Reads `GET /oauth/callback?code=..&state=.. HTTP/1.1`.
fn parse_callback(request_line: &str, expected_state: &str) -> Callback {
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return Callback::Ignored;
    };
    let Ok(url) = Url::parse(&format!("http://127.0.0.1{target}")) else {
        return Callback::Ignored;
    };
    if url.path() != CALLBACK_PATH {
        return Callback::Ignored;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Callback::Ignored;
    }
    match (code, error) {
        (_, Some(error)) => Callback::Denied(error),
        (Some(code), None) if !code.is_empty() => Callback::Code(code),
        _ => Callback::Ignored,
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
