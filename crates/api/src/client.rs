use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use hubauth_signin::endpoint::html_root;
use hubauth_signin::{
    Account, AuthorizationOutcome, AuthorizationService, ServerMetadata, ServiceError,
    TwoFactorChannel,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_MEDIA_TYPE: &str = "application/vnd.github.v3+json";
const OTP_HEADER: &str = "X-GitHub-OTP";
const BASIC_AUTH_ONLY_MESSAGE: &str =
    "This API can only be accessed with username and password Basic Auth";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "hubauth/0.2".to_string(),
            connect_timeout_secs: 5,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthorizationRequest<'a> {
    scopes: &'a [String],
    client_id: &'a str,
    client_secret: &'a str,
    note: &'a str,
    fingerprint: String,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizationBody {
    token: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    login: String,
    id: u64,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenBody {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct GitHubApi {
    client: Client,
    app: OAuthApp,
}

impl GitHubApi {
    pub fn new(app: OAuthApp, settings: &HttpSettings) -> Self {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client, app)
    }

    pub fn with_client(client: Client, app: OAuthApp) -> Self {
        Self { client, app }
    }

    pub fn app(&self) -> &OAuthApp {
        &self.app
    }

    pub async fn authorize(
        &self,
        endpoint: &str,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> ApiResult<AuthorizationOutcome> {
        let body = AuthorizationRequest {
            scopes: &self.app.scopes,
            client_id: &self.app.client_id,
            client_secret: &self.app.client_secret,
            note: "hubauth",
            fingerprint: fingerprint(),
        };
        let mut request = self
            .client
            .post(format!("{}/authorizations", trim(endpoint)))
            .basic_auth(username, Some(password))
            .header(ACCEPT, API_MEDIA_TYPE)
            .json(&body);
        if let Some(otp) = otp {
            request = request.header(OTP_HEADER, otp);
        }

        let response = request.send().await?;
        let status = response.status();
        let otp_header = response
            .headers()
            .get(OTP_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = response.text().await?;

        let outcome = classify_authorization(status, otp_header.as_deref(), &text);
        debug!(%status, ?outcome, "Authorization response classified");
        Ok(outcome)
    }

    pub async fn get_user(&self, endpoint: &str, token: &str) -> ApiResult<Account> {
        let response = self
            .client
            .get(format!("{}/user", trim(endpoint)))
            .header(ACCEPT, API_MEDIA_TYPE)
            .header(AUTHORIZATION, format!("token {}", token))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::status(response.status()));
        }

        let user: UserBody = serde_json::from_str(&response.text().await?)?;
        Ok(Account {
            login: user.login,
            id: user.id,
            name: user.name,
            email: user.email,
            avatar_url: user.avatar_url,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        })
    }

    pub async fn get_metadata(&self, endpoint: &str) -> ApiResult<ServerMetadata> {
        let response = self
            .client
            .get(format!("{}/meta", trim(endpoint)))
            .header(ACCEPT, API_MEDIA_TYPE)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::status(response.status()));
        }
        Ok(serde_json::from_str(&response.text().await?)?)
    }

    /// Trades an OAuth callback code for an access token.
    pub async fn exchange_code(
        &self,
        endpoint: &str,
        code: &str,
        redirect_uri: &str,
    ) -> ApiResult<String> {
        let response = self
            .client
            .post(format!("{}/login/oauth/access_token", html_root(endpoint)))
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::status(response.status()));
        }

        let data: AccessTokenBody = serde_json::from_str(&response.text().await?)?;
        match (data.access_token, data.error) {
            (Some(token), None) if !token.is_empty() => Ok(token),
            (_, error) => Err(ApiError::Api(format!(
                "OAuth exchange failed: {}",
                data.error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }
}

#[async_trait]
impl AuthorizationService for GitHubApi {
    async fn create_authorization(
        &self,
        endpoint: &str,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<AuthorizationOutcome, ServiceError> {
        self.authorize(endpoint, username, password, otp)
            .await
            .map_err(ServiceError::from)
    }

    async fn fetch_user(&self, endpoint: &str, token: &str) -> Result<Account, ServiceError> {
        self.get_user(endpoint, token)
            .await
            .map_err(ServiceError::from)
    }

    async fn fetch_metadata(&self, endpoint: &str) -> Result<ServerMetadata, ServiceError> {
        self.get_metadata(endpoint)
            .await
            .map_err(ServiceError::from)
    }
}

/// Maps an authorization response onto the outcome the sign-in flow acts on.
pub fn classify_authorization(
    status: StatusCode,
    otp_header: Option<&str>,
    body: &str,
) -> AuthorizationOutcome {
    let parsed: AuthorizationBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_default();
    let lowered = message.to_lowercase();

    match status.as_u16() {
        200 | 201 => match parsed.token.filter(|t| !t.is_empty()) {
            Some(token) => AuthorizationOutcome::Authorized { token },
            None => AuthorizationOutcome::ServiceError {
                status: status.as_u16(),
                status_text: "The authorization response did not include a token".to_string(),
            },
        },
        401 => match otp_header.and_then(parse_otp_header) {
            Some(channel) => AuthorizationOutcome::TwoFactorRequired { channel },
            None if requires_web_flow(&lowered) => AuthorizationOutcome::WebFlowRequired,
            None => AuthorizationOutcome::Failed,
        },
        403 if message == BASIC_AUTH_ONLY_MESSAGE => {
            AuthorizationOutcome::PersonalAccessTokenBlocked
        }
        403 if lowered.contains("verify your email") || lowered.contains("unverified email") => {
            AuthorizationOutcome::UserRequiresVerification
        }
        403 | 422 if requires_web_flow(&lowered) => AuthorizationOutcome::WebFlowRequired,
        410 => AuthorizationOutcome::WebFlowRequired,
        415 => AuthorizationOutcome::EnterpriseTooOld,
        _ => AuthorizationOutcome::ServiceError {
            status: status.as_u16(),
            status_text: if message.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                message
            },
        },
    }
}

fn requires_web_flow(message: &str) -> bool {
    message.contains("web flow")
        || message.contains("web-based")
        || (message.contains("password") && message.contains("deprecat"))
}

/// Parses `required; app` style values. Anything that is not a requirement
/// yields `None`.
fn parse_otp_header(value: &str) -> Option<TwoFactorChannel> {
    let mut parts = value.split(';').map(str::trim);
    if !parts.next()?.eq_ignore_ascii_case("required") {
        return None;
    }
    let channel = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("app") => TwoFactorChannel::App,
        Some("sms") => TwoFactorChannel::Sms,
        _ => TwoFactorChannel::Unknown,
    };
    Some(channel)
}

fn fingerprint() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn trim(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}
