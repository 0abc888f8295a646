use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInStep {
    EndpointEntry,
    Authentication,
    TwoFactorAuthentication,
    Success,
}

impl fmt::Display for SignInStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignInStep::EndpointEntry => "endpoint entry",
            SignInStep::Authentication => "authentication",
            SignInStep::TwoFactorAuthentication => "two-factor authentication",
            SignInStep::Success => "success",
        };
        f.write_str(name)
    }
}

/// Initial step of an enterprise flow, waiting for the instance address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointEntryState {
    pub error: Option<FlowError>,
    pub loading: bool,
}

/// Credential or browser entry against a resolved API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationState {
    pub endpoint: String,
    pub supports_basic_auth: bool,
    pub forgot_password_url: String,
    pub error: Option<FlowError>,
    pub loading: bool,
}

/// Entered after a basic-auth attempt asked for a second factor.
///
/// The password is kept only so the authorization can be retried with the
/// one-time code. It is never serialized and is redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct TwoFactorState {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub otp_channel: TwoFactorChannel,
    pub error: Option<FlowError>,
    pub loading: bool,
}

impl fmt::Debug for TwoFactorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoFactorState")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("otp_channel", &self.otp_channel)
            .field("error", &self.error)
            .field("loading", &self.loading)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInState {
    EndpointEntry(EndpointEntryState),
    Authentication(AuthenticationState),
    TwoFactorAuthentication(TwoFactorState),
    Success,
}

impl SignInState {
    pub fn step(&self) -> SignInStep {
        match self {
            SignInState::EndpointEntry(_) => SignInStep::EndpointEntry,
            SignInState::Authentication(_) => SignInStep::Authentication,
            SignInState::TwoFactorAuthentication(_) => SignInStep::TwoFactorAuthentication,
            SignInState::Success => SignInStep::Success,
        }
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            SignInState::EndpointEntry(s) => s.error.as_ref(),
            SignInState::Authentication(s) => s.error.as_ref(),
            SignInState::TwoFactorAuthentication(s) => s.error.as_ref(),
            SignInState::Success => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        match self {
            SignInState::EndpointEntry(s) => s.loading,
            SignInState::Authentication(s) => s.loading,
            SignInState::TwoFactorAuthentication(s) => s.loading,
            SignInState::Success => false,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            SignInState::Authentication(s) => Some(&s.endpoint),
            SignInState::TwoFactorAuthentication(s) => Some(&s.endpoint),
            SignInState::EndpointEntry(_) | SignInState::Success => None,
        }
    }

    pub(crate) fn with_loading(mut self, loading: bool) -> Self {
        match &mut self {
            SignInState::EndpointEntry(s) => s.loading = loading,
            SignInState::Authentication(s) => s.loading = loading,
            SignInState::TwoFactorAuthentication(s) => s.loading = loading,
            SignInState::Success => {}
        }
        self
    }

    /// Records a user-correctable error and clears `loading`, keeping the step.
    pub(crate) fn with_error(mut self, error: FlowError) -> Self {
        match &mut self {
            SignInState::EndpointEntry(s) => {
                s.error = Some(error);
                s.loading = false;
            }
            SignInState::Authentication(s) => {
                s.error = Some(error);
                s.loading = false;
            }
            SignInState::TwoFactorAuthentication(s) => {
                s.error = Some(error);
                s.loading = false;
            }
            SignInState::Success => {}
        }
        self
    }
}

/// Delivery channel of the second factor, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorChannel {
    App,
    Sms,
    Unknown,
}

impl fmt::Display for TwoFactorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoFactorChannel::App => f.write_str("authenticator app"),
            TwoFactorChannel::Sms => f.write_str("SMS"),
            TwoFactorChannel::Unknown => f.write_str("unknown channel"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub endpoint: String,
    #[serde(skip_serializing, default)]
    pub token: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("login", &self.login)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("avatar_url", &self.avatar_url)
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Basic,
    Web,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Basic => f.write_str("basic"),
            AuthMethod::Web => f.write_str("web"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub account: Account,
    pub method: AuthMethod,
}

/// Result of a single authorization attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Authorized { token: String },
    TwoFactorRequired { channel: TwoFactorChannel },
    Failed,
    ServiceError { status: u16, status_text: String },
    UserRequiresVerification,
    PersonalAccessTokenBlocked,
    EnterpriseTooOld,
    WebFlowRequired,
}

impl fmt::Debug for AuthorizationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationOutcome::Authorized { .. } => f
                .debug_struct("Authorized")
                .field("token", &"<redacted>")
                .finish(),
            AuthorizationOutcome::TwoFactorRequired { channel } => f
                .debug_struct("TwoFactorRequired")
                .field("channel", channel)
                .finish(),
            AuthorizationOutcome::Failed => f.write_str("Failed"),
            AuthorizationOutcome::ServiceError {
                status,
                status_text,
            } => f
                .debug_struct("ServiceError")
                .field("status", status)
                .field("status_text", status_text)
                .finish(),
            AuthorizationOutcome::UserRequiresVerification => f.write_str("UserRequiresVerification"),
            AuthorizationOutcome::PersonalAccessTokenBlocked => {
                f.write_str("PersonalAccessTokenBlocked")
            }
            AuthorizationOutcome::EnterpriseTooOld => f.write_str("EnterpriseTooOld"),
            AuthorizationOutcome::WebFlowRequired => f.write_str("WebFlowRequired"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    #[serde(rename = "verifiable_password_authentication", default)]
    pub supports_basic_auth: bool,
}
