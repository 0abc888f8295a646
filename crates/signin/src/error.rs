use crate::types::SignInStep;
use thiserror::Error;

/// Failure reported by a collaborator (authorization service, browser delegate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Server responded with {status}: {status_text}")]
    Status { status: u16, status_text: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Browser sign-in failed: {0}")]
    Browser(String),
}

impl ServiceError {
    pub fn is_host_not_found(&self) -> bool {
        matches!(self, ServiceError::HostNotFound(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ServiceError::HostNotFound(_) => "The server could not be found.",
            ServiceError::Network(_) => "Network error. Check your connection.",
            ServiceError::Timeout(_) => "Request timed out. Please try again.",
            ServiceError::Status { .. } => "Server error. Please try again later.",
            ServiceError::Decode(_) => "The server sent a response that could not be understood.",
            ServiceError::Browser(_) => "Signing in through the browser failed.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UrlValidationError {
    #[error("invalid URL")]
    InvalidUrl,

    #[error("unsupported protocol")]
    InvalidProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error(
        "Unable to authenticate with the enterprise instance at {endpoint}. Verify that the URL is \
         correct, that the instance is running a supported version, and that you have an internet \
         connection, then try again."
    )]
    Unreachable { endpoint: String },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// User-correctable error attached to the current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error(
        "The enterprise instance address doesn't appear to be a valid URL. We're expecting \
         something like https://github.example.com."
    )]
    InvalidUrl,

    #[error(
        "Unsupported protocol. Only http or https is supported when authenticating with \
         enterprise instances."
    )]
    InvalidProtocol,

    #[error("The server could not be found. Check the address and your internet connection.")]
    HostNotFound,

    #[error("Incorrect email or password.")]
    IncorrectEmailOrPassword,

    #[error("Incorrect username or password.")]
    IncorrectUsernameOrPassword,

    #[error("Two-factor authentication failed.")]
    TwoFactorFailed,

    #[error("The server responded with an error while attempting to authenticate ({status})\n\n{status_text}")]
    Server { status: u16, status_text: String },

    #[error(
        "Your account has not been verified. Please verify your email address on the web, then \
         try again."
    )]
    UnverifiedEmail,

    #[error(
        "A personal access token cannot be used to sign in here. Sign in with your password or \
         through the browser instead."
    )]
    PersonalAccessTokenBlocked,

    #[error("The enterprise server version is too old and is no longer supported.")]
    EnterpriseTooOld,

    #[error(transparent)]
    Capability(CapabilityError),

    #[error(transparent)]
    Service(ServiceError),
}

impl From<UrlValidationError> for FlowError {
    fn from(error: UrlValidationError) -> Self {
        match error {
            UrlValidationError::InvalidUrl => FlowError::InvalidUrl,
            UrlValidationError::InvalidProtocol => FlowError::InvalidProtocol,
        }
    }
}

impl From<CapabilityError> for FlowError {
    fn from(error: CapabilityError) -> Self {
        match error {
            CapabilityError::Service(ServiceError::HostNotFound(_)) => FlowError::HostNotFound,
            other => FlowError::Capability(other),
        }
    }
}

/// Contract violations by the caller of the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignInError {
    #[error("`{operation}` requires the {expected} step, but the flow is {}", describe_step(.actual))]
    WrongStep {
        operation: &'static str,
        expected: SignInStep,
        actual: Option<SignInStep>,
    },
}

fn describe_step(step: &Option<SignInStep>) -> String {
    match step {
        Some(step) => format!("at the {step} step"),
        None => "not started".to_string(),
    }
}

pub type SignInResult<T> = Result<T, SignInError>;
