use directories::ProjectDirs;
use hubauth_api::{HttpSettings, OAuthApp};
use hubauth_signin::SignInConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub signin: SignInConfig,
    pub oauth: OAuthConfig,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_port: u16,
    pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_port: 0,
            scopes: vec!["repo".to_string(), "user".to_string(), "workflow".to_string()],
        }
    }
}

impl OAuthConfig {
    pub fn app(&self) -> OAuthApp {
        OAuthApp {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Using default config: {e}");
                Self::default()
            }
        }
    }

    /// `HUBAUTH_CLIENT_ID` and `HUBAUTH_CLIENT_SECRET` win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(client_id) = lookup("HUBAUTH_CLIENT_ID").filter(|v| !v.is_empty()) {
            self.oauth.client_id = client_id;
        }
        if let Some(secret) = lookup("HUBAUTH_CLIENT_SECRET").filter(|v| !v.is_empty()) {
            self.oauth.client_secret = secret;
        }
    }
}

pub fn default_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "hubauth", "hubauth") {
        proj_dirs.config_dir().join("config.toml")
    } else {
        PathBuf::from("config/default.toml")
    }
}
