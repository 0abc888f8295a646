//! Sign-in flow state machine.
//!
//! Exactly one flow exists per store. Every operation validates the current
//! step, publishes a `loading` copy of the state, awaits its collaborators and
//! then commits the next state only if it is still the latest attempt of the
//! same flow. A result that arrives after `reset()`, after a new flow began, or
//! after a newer attempt started is dropped without writing anything.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capability::CapabilityCache;
use crate::config::SignInConfig;
use crate::endpoint::{
    enterprise_api_endpoint, forgot_password_url, same_endpoint, DefaultUrlValidator,
    UrlValidator,
};
use crate::error::{FlowError, ServiceError, SignInError, SignInResult};
use crate::events::Emitter;
use crate::service::{AuthorizationService, BrowserAuthenticator};
use crate::types::{
    Account, AuthMethod, Authenticated, AuthenticationState, AuthorizationOutcome,
    EndpointEntryState, SignInState, SignInStep, TwoFactorState,
};

pub struct Collaborators {
    pub authorization: Arc<dyn AuthorizationService>,
    pub browser: Arc<dyn BrowserAuthenticator>,
    pub url_validator: Arc<dyn UrlValidator>,
}

impl Collaborators {
    pub fn new(
        authorization: Arc<dyn AuthorizationService>,
        browser: Arc<dyn BrowserAuthenticator>,
    ) -> Self {
        Self {
            authorization,
            browser,
            url_validator: Arc::new(DefaultUrlValidator),
        }
    }

    pub fn with_url_validator(mut self, validator: Arc<dyn UrlValidator>) -> Self {
        self.url_validator = validator;
        self
    }
}

#[derive(Default)]
struct Slot {
    state: Option<SignInState>,
    /// Bumped whenever a flow begins or is reset.
    flow: u64,
    /// Bumped whenever a step operation starts.
    attempt: u64,
    /// Snapshots written but not yet delivered, in write order.
    pending: VecDeque<Option<SignInState>>,
    /// Set while some task is draining `pending`.
    delivering: bool,
}

impl Slot {
    /// Queues the snapshot of a write made under this lock. Returns whether
    /// the caller has to deliver the queue itself.
    fn queue(&mut self, snapshot: Option<SignInState>) -> bool {
        self.pending.push_back(snapshot);
        !std::mem::replace(&mut self.delivering, true)
    }
}

/// Identifies the attempt a pending result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    flow: u64,
    attempt: u64,
    step: SignInStep,
}

impl Ticket {
    fn is_current(&self, slot: &Slot) -> bool {
        slot.flow == self.flow
            && slot.attempt == self.attempt
            && slot.state.as_ref().map(SignInState::step) == Some(self.step)
    }
}

struct Inner {
    slot: Mutex<Slot>,
    authorization: Arc<dyn AuthorizationService>,
    browser: Arc<dyn BrowserAuthenticator>,
    url_validator: Arc<dyn UrlValidator>,
    capabilities: CapabilityCache,
    hosted_endpoint: String,
    changes: Emitter<Option<SignInState>>,
    authenticated: Emitter<Authenticated>,
    errors: Emitter<ServiceError>,
}

#[derive(Clone)]
pub struct SignInStore {
    inner: Arc<Inner>,
}

impl SignInStore {
    pub fn new(config: &SignInConfig, collaborators: Collaborators) -> Self {
        Self::with_capabilities(config, collaborators, CapabilityCache::new(config))
    }

    /// Builds a store around an existing cache so several stores (or a
    /// restarted one) keep the same capability knowledge.
    pub fn with_capabilities(
        config: &SignInConfig,
        collaborators: Collaborators,
        capabilities: CapabilityCache,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::default()),
                authorization: collaborators.authorization,
                browser: collaborators.browser,
                url_validator: collaborators.url_validator,
                capabilities,
                hosted_endpoint: config.hosted_endpoint.clone(),
                changes: Emitter::new(),
                authenticated: Emitter::new(),
                errors: Emitter::new(),
            }),
        }
    }

    pub fn state(&self) -> Option<SignInState> {
        self.slot().state.clone()
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.inner.capabilities
    }

    /// Snapshot after every state write, `None` once the flow is reset.
    pub fn changes(&self) -> &Emitter<Option<SignInState>> {
        &self.inner.changes
    }

    /// Fired once per flow that reaches `Success`.
    pub fn authenticated(&self) -> &Emitter<Authenticated> {
        &self.inner.authenticated
    }

    pub fn capability_updates(&self) -> &Emitter<bool> {
        self.inner.capabilities.hosted_updates()
    }

    /// Failures the current step cannot recover from in-state.
    pub fn errors(&self) -> &Emitter<ServiceError> {
        &self.inner.errors
    }

    /// Starts a flow against the hosted service, replacing any flow in
    /// progress.
    ///
    /// The initial `supports_basic_auth` is the cached value or the deadline
    /// heuristic. The returned task refreshes it from the server and must be
    /// spawned inside a Tokio runtime.
    pub fn begin_hosted_sign_in(&self) -> JoinHandle<()> {
        let endpoint = self.inner.hosted_endpoint.clone();
        let state = SignInState::Authentication(AuthenticationState {
            supports_basic_auth: self.inner.capabilities.try_synchronous_read(&endpoint),
            forgot_password_url: forgot_password_url(&endpoint),
            endpoint: endpoint.clone(),
            error: None,
            loading: false,
        });
        let flow = self.begin(state);
        info!(endpoint = %endpoint, "Hosted sign-in started");

        let store = self.clone();
        tokio::spawn(async move { store.refresh_capability(flow, endpoint).await })
    }

    pub fn begin_enterprise_sign_in(&self) {
        self.begin(SignInState::EndpointEntry(EndpointEntryState::default()));
        info!("Enterprise sign-in started");
    }

    pub fn reset(&self) {
        let deliver = {
            let mut slot = self.slot();
            slot.flow += 1;
            slot.state = None;
            slot.queue(None)
        };
        debug!("Sign-in flow reset");
        if deliver {
            self.deliver_changes();
        }
    }

    pub async fn set_endpoint(&self, raw_url: &str) -> SignInResult<()> {
        let (ticket, ()) = self.start("set_endpoint", SignInStep::EndpointEntry, |state| {
            matches!(state, SignInState::EndpointEntry(_)).then_some(())
        })?;

        let url = match self.inner.url_validator.validate(raw_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Rejected enterprise address: {e}");
                self.commit(ticket, |state| state.with_error(e.into()));
                return Ok(());
            }
        };

        let endpoint = enterprise_api_endpoint(&url);
        match self
            .inner
            .capabilities
            .probe(self.inner.authorization.as_ref(), &endpoint)
            .await
        {
            Ok(supports_basic_auth) => {
                let forgot_password_url = forgot_password_url(&endpoint);
                self.commit(ticket, |_| {
                    SignInState::Authentication(AuthenticationState {
                        endpoint,
                        supports_basic_auth,
                        forgot_password_url,
                        error: None,
                        loading: false,
                    })
                });
            }
            Err(e) => {
                debug!(endpoint = %endpoint, "Enterprise probe failed: {e}");
                self.commit(ticket, |state| state.with_error(e.into()));
            }
        }
        Ok(())
    }

    pub async fn authenticate_with_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> SignInResult<()> {
        let (ticket, endpoint) = self.start(
            "authenticate_with_credentials",
            SignInStep::Authentication,
            |state| match state {
                SignInState::Authentication(s) => Some(s.endpoint.clone()),
                _ => None,
            },
        )?;

        let outcome = match self
            .inner
            .authorization
            .create_authorization(&endpoint, username, password, None)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_out_of_band(ticket, e);
                return Ok(());
            }
        };
        if !self.is_current(ticket) {
            warn!("Discarding authorization result for an abandoned attempt");
            return Ok(());
        }

        debug!(?outcome, "Authorization attempt completed");
        match outcome {
            AuthorizationOutcome::Authorized { token } => {
                self.complete_basic(ticket, &endpoint, &token).await;
            }
            AuthorizationOutcome::TwoFactorRequired { channel } => {
                self.commit(ticket, |_| {
                    SignInState::TwoFactorAuthentication(TwoFactorState {
                        endpoint,
                        username: username.to_string(),
                        password: password.to_string(),
                        otp_channel: channel,
                        error: None,
                        loading: false,
                    })
                });
            }
            AuthorizationOutcome::Failed => {
                let error = if looks_like_email(username) {
                    FlowError::IncorrectEmailOrPassword
                } else {
                    FlowError::IncorrectUsernameOrPassword
                };
                self.fail(ticket, error);
            }
            AuthorizationOutcome::ServiceError {
                status,
                status_text,
            } => self.fail(ticket, FlowError::Server { status, status_text }),
            AuthorizationOutcome::UserRequiresVerification => {
                self.fail(ticket, FlowError::UnverifiedEmail)
            }
            AuthorizationOutcome::PersonalAccessTokenBlocked => {
                self.fail(ticket, FlowError::PersonalAccessTokenBlocked)
            }
            AuthorizationOutcome::EnterpriseTooOld => self.fail(ticket, FlowError::EnterpriseTooOld),
            AuthorizationOutcome::WebFlowRequired => self.require_web_flow(ticket, &endpoint),
        }
        Ok(())
    }

    /// Hands the sign-in to the browser. There is no timeout: an abandoned
    /// browser session keeps the step loading until `reset()`.
    pub async fn authenticate_with_browser(&self) -> SignInResult<()> {
        let (ticket, endpoint) = self.start(
            "authenticate_with_browser",
            SignInStep::Authentication,
            |state| match state {
                SignInState::Authentication(s) => Some(s.endpoint.clone()),
                _ => None,
            },
        )?;

        match self.inner.browser.authenticate(&endpoint).await {
            Ok(account) => self.succeed(ticket, account, AuthMethod::Web),
            Err(e) => {
                debug!("Browser sign-in failed: {e}");
                self.fail(ticket, FlowError::Service(e));
            }
        }
        Ok(())
    }

    pub async fn submit_two_factor_code(&self, otp: &str) -> SignInResult<()> {
        let (ticket, pending) = self.start(
            "submit_two_factor_code",
            SignInStep::TwoFactorAuthentication,
            |state| match state {
                SignInState::TwoFactorAuthentication(s) => {
                    Some((s.endpoint.clone(), s.username.clone(), s.password.clone()))
                }
                _ => None,
            },
        )?;
        let (endpoint, username, password) = pending;

        let outcome = match self
            .inner
            .authorization
            .create_authorization(&endpoint, &username, &password, Some(otp))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_out_of_band(ticket, e);
                return Ok(());
            }
        };
        if !self.is_current(ticket) {
            warn!("Discarding two-factor result for an abandoned attempt");
            return Ok(());
        }

        debug!(?outcome, "Two-factor attempt completed");
        match outcome {
            AuthorizationOutcome::Authorized { token } => {
                self.complete_basic(ticket, &endpoint, &token).await;
            }
            // The server does not tell a wrong code apart from a repeated
            // two-factor demand here.
            AuthorizationOutcome::TwoFactorRequired { .. } | AuthorizationOutcome::Failed => {
                self.fail(ticket, FlowError::TwoFactorFailed)
            }
            AuthorizationOutcome::ServiceError {
                status,
                status_text,
            } => self.fail_out_of_band(
                ticket,
                ServiceError::Status {
                    status,
                    status_text,
                },
            ),
            AuthorizationOutcome::UserRequiresVerification => {
                self.fail(ticket, FlowError::UnverifiedEmail)
            }
            AuthorizationOutcome::PersonalAccessTokenBlocked => {
                self.fail(ticket, FlowError::PersonalAccessTokenBlocked)
            }
            AuthorizationOutcome::EnterpriseTooOld => self.fail(ticket, FlowError::EnterpriseTooOld),
            AuthorizationOutcome::WebFlowRequired => self.require_web_flow(ticket, &endpoint),
        }
        Ok(())
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, state: SignInState) -> u64 {
        let (flow, deliver) = {
            let mut slot = self.slot();
            if let Some(previous) = &slot.state {
                debug!(step = %previous.step(), "Abandoning sign-in flow in progress");
            }
            slot.flow += 1;
            slot.state = Some(state.clone());
            (slot.flow, slot.queue(Some(state)))
        };
        if deliver {
            self.deliver_changes();
        }
        flow
    }

    /// Delivers queued snapshots until the queue is empty. Writers that find
    /// a delivery in progress only queue, so listeners always see writes in
    /// the order they happened, even across tasks and from within a listener.
    fn deliver_changes(&self) {
        loop {
            let snapshot = {
                let mut slot = self.slot();
                match slot.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        slot.delivering = false;
                        return;
                    }
                }
            };
            self.inner.changes.emit(&snapshot);
        }
    }

    /// Validates the step, marks it loading and hands out the ticket that a
    /// later commit must present.
    fn start<T>(
        &self,
        operation: &'static str,
        step: SignInStep,
        extract: impl FnOnce(&SignInState) -> Option<T>,
    ) -> SignInResult<(Ticket, T)> {
        let (ticket, value, deliver) = {
            let mut slot = self.slot();
            let current = slot.state.clone();
            let Some(value) = current.as_ref().and_then(extract) else {
                let actual = current.as_ref().map(SignInState::step);
                error!(operation, expected = %step, ?actual, "Sign-in operation invoked from the wrong step");
                return Err(SignInError::WrongStep {
                    operation,
                    expected: step,
                    actual,
                });
            };
            let next = current.map(|state| state.with_loading(true));
            slot.state = next.clone();
            slot.attempt += 1;
            let ticket = Ticket {
                flow: slot.flow,
                attempt: slot.attempt,
                step,
            };
            (ticket, value, slot.queue(next))
        };
        debug!(operation, "Sign-in step started");
        if deliver {
            self.deliver_changes();
        }
        Ok((ticket, value))
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket.is_current(&self.slot())
    }

    /// Replaces the state with `next(current)` if the ticket still owns the
    /// flow. Returns whether anything was written.
    fn commit(&self, ticket: Ticket, next: impl FnOnce(SignInState) -> SignInState) -> bool {
        let deliver = {
            let mut slot = self.slot();
            if !ticket.is_current(&slot) {
                warn!(step = %ticket.step, "Discarding stale sign-in result");
                return false;
            }
            let Some(current) = slot.state.take() else {
                return false;
            };
            let state = next(current);
            debug!(from = %ticket.step, to = %state.step(), "Sign-in state committed");
            slot.state = Some(state.clone());
            slot.queue(Some(state))
        };
        if deliver {
            self.deliver_changes();
        }
        true
    }

    fn fail(&self, ticket: Ticket, error: FlowError) {
        self.commit(ticket, |state| state.with_error(error));
    }

    fn fail_out_of_band(&self, ticket: Ticket, error: ServiceError) {
        if self.commit(ticket, |state| state.with_loading(false)) {
            error!("Sign-in failed: {error}");
            self.inner.errors.emit(&error);
        }
    }

    fn require_web_flow(&self, ticket: Ticket, endpoint: &str) {
        self.inner.capabilities.record(endpoint, false);
        self.commit(ticket, |state| match state {
            SignInState::Authentication(s) => SignInState::Authentication(AuthenticationState {
                supports_basic_auth: false,
                error: None,
                loading: false,
                ..s
            }),
            other => SignInState::Authentication(AuthenticationState {
                endpoint: other.endpoint().unwrap_or(endpoint).to_string(),
                supports_basic_auth: false,
                forgot_password_url: forgot_password_url(endpoint),
                error: None,
                loading: false,
            }),
        });
    }

    async fn complete_basic(&self, ticket: Ticket, endpoint: &str, token: &str) {
        match self.inner.authorization.fetch_user(endpoint, token).await {
            Ok(account) => self.succeed(ticket, account, AuthMethod::Basic),
            Err(e) => self.fail_out_of_band(ticket, e),
        }
    }

    fn succeed(&self, ticket: Ticket, account: Account, method: AuthMethod) {
        if !self.is_current(ticket) {
            warn!(%method, "Discarding sign-in for an abandoned attempt");
            return;
        }
        info!(login = %account.login, %method, "Signed in");
        self.inner.authenticated.emit(&Authenticated { account, method });
        self.commit(ticket, |_| SignInState::Success);
    }

    async fn refresh_capability(&self, flow: u64, endpoint: String) {
        let supported = match self
            .inner
            .capabilities
            .probe(self.inner.authorization.as_ref(), &endpoint)
            .await
        {
            Ok(supported) => supported,
            Err(e) => {
                warn!(endpoint = %endpoint, "Capability refresh failed: {e}");
                return;
            }
        };

        let deliver = {
            let mut slot = self.slot();
            let next = match &slot.state {
                Some(SignInState::Authentication(s))
                    if slot.flow == flow && same_endpoint(&s.endpoint, &endpoint) =>
                {
                    SignInState::Authentication(AuthenticationState {
                        supports_basic_auth: supported,
                        ..s.clone()
                    })
                }
                _ => {
                    debug!(endpoint = %endpoint, "Dropping capability refresh for a finished flow");
                    return;
                }
            };
            slot.state = Some(next.clone());
            slot.queue(Some(next))
        };
        if deliver {
            self.deliver_changes();
        }
    }
}

fn looks_like_email(identifier: &str) -> bool {
    identifier.contains('@')
}
