mod app;
mod config;

use app::{Mode, Prompter};
use clap::Parser;
use config::Config;
use hubauth_api::{BrowserFlow, GitHubApi};
use hubauth_signin::{Collaborators, SignInState, SignInStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hubauth", version, about = "Sign in to GitHub or a GitHub Enterprise instance")]
struct Args {
    /// Sign in to an enterprise instance, optionally giving its address.
    #[arg(long, value_name = "URL")]
    enterprise: Option<Option<String>>,

    /// Skip the password prompt and sign in through the browser.
    #[arg(long)]
    browser: bool,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hubauth=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::default_path);
    let mut config = Config::load_or_default(&config_path);
    config.apply_env();
    if config.oauth.client_id.is_empty() {
        warn!("No OAuth client id configured, browser sign-in will be rejected");
    }

    let api = GitHubApi::new(config.oauth.app(), &config.http);
    let browser = BrowserFlow::new(api.clone(), config.oauth.redirect_port);
    let store = SignInStore::new(
        &config.signin,
        Collaborators::new(Arc::new(api), Arc::new(browser)),
    );

    store.capability_updates().subscribe(|supported: &bool| {
        debug!(supported = *supported, "Hosted password sign-in availability");
    });
    store.changes().subscribe(|state: &Option<SignInState>| {
        debug!(
            step = ?state.as_ref().map(SignInState::step),
            loading = state.as_ref().is_some_and(SignInState::is_loading),
            "Sign-in state changed"
        );
    });

    let mode = match args.enterprise {
        Some(address) => Mode::Enterprise { address },
        None => Mode::Hosted,
    };
    let mut prompter = Prompter::new();

    tokio::select! {
        result = app::run(&store, mode, args.browser, &mut prompter) => {
            let signed_in = result?;
            println!(
                "Signed in as {} on {} using {} authentication.",
                signed_in.account.login, signed_in.account.endpoint, signed_in.method
            );
        }
        _ = tokio::signal::ctrl_c() => {
            store.reset();
            eprintln!("Sign-in cancelled.");
        }
    }

    Ok(())
}
