use anyhow::{anyhow, bail, Result};
use hubauth_signin::endpoint::html_root;
use hubauth_signin::{Authenticated, SignInState, SignInStore};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Hosted,
    Enterprise { address: Option<String> },
}

pub struct Prompter {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompter {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub async fn ask(&mut self, label: &str) -> Result<String> {
        print!("{label}: ");
        std::io::stdout().flush()?;
        match self.lines.next_line().await? {
            Some(line) => Ok(line),
            None => bail!("Input closed"),
        }
    }
}

/// Drives one flow from start to the authenticated account.
pub async fn run(
    store: &SignInStore,
    mode: Mode,
    prefer_browser: bool,
    prompter: &mut Prompter,
) -> Result<Authenticated> {
    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();
    let auth_sub = store.authenticated().forward(auth_tx);
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let error_sub = store.errors().forward(error_tx);

    let mut address = match mode {
        Mode::Hosted => {
            // Wait for the capability probe so the first prompt offers the
            // right path. The probe bounds itself.
            if let Err(e) = store.begin_hosted_sign_in().await {
                warn!("Capability refresh task failed: {e}");
            }
            None
        }
        Mode::Enterprise { address } => {
            store.begin_enterprise_sign_in();
            address
        }
    };

    let result = async {
        loop {
            while let Ok(error) = error_rx.try_recv() {
                eprintln!("{} ({error})", error.user_message());
            }

            let Some(state) = store.state() else {
                bail!("Sign-in was cancelled");
            };
            if let Some(error) = state.error() {
                eprintln!("{error}");
            }

            match state {
                SignInState::EndpointEntry(_) => {
                    let raw = match address.take() {
                        Some(raw) => raw,
                        None => prompter.ask("Enterprise address").await?,
                    };
                    store.set_endpoint(&raw).await?;
                }
                SignInState::Authentication(s) if prefer_browser || !s.supports_basic_auth => {
                    if s.error.is_some() {
                        bail!("Browser sign-in did not complete");
                    }
                    println!(
                        "Continue signing in to {} in your browser.",
                        html_root(&s.endpoint)
                    );
                    store.authenticate_with_browser().await?;
                }
                SignInState::Authentication(s) => {
                    if s.error.is_some() {
                        println!("Forgot your password? {}", s.forgot_password_url);
                    }
                    let username = prompter.ask("Username or email").await?;
                    let password = prompter.ask("Password").await?;
                    store
                        .authenticate_with_credentials(username.trim(), &password)
                        .await?;
                }
                SignInState::TwoFactorAuthentication(s) => {
                    let label = format!("Two-factor code ({})", s.otp_channel);
                    let code = prompter.ask(&label).await?;
                    store.submit_two_factor_code(code.trim()).await?;
                }
                SignInState::Success => {
                    return auth_rx
                        .recv()
                        .await
                        .ok_or_else(|| anyhow!("Sign-in finished without an account"));
                }
            }
        }
    }
    .await;

    store.authenticated().unsubscribe(auth_sub);
    store.errors().unsubscribe(error_sub);
    result
}
