//! Configuration loading for mail services
//!
//! OAuth client credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials (for production builds)
//! 2. JSON file (Google Cloud Console format)
//! 3. Runtime environment variables (fallback)
//!
//! Runtime settings ([`ServiceConfig`]) come from `GAZETTE_*` and
//! `OPENAI_*` environment variables, each with a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credentials filename in the Gazette config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Token filename in the Gazette config directory
pub const TOKEN_FILE: &str = "gmail-tokens.json";

/// Folder configuration filename in the Gazette config directory
pub const FOLDER_CONFIG_FILE: &str = "folder-config.json";

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format (installed app)
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials (for production builds)
    /// 2. JSON file (~/.config/gazette/google-credentials.json)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Load credentials embedded at compile time via environment variables.
    /// Build with: GOOGLE_CLIENT_ID=xxx GOOGLE_CLIENT_SECRET=yyy cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Get the default credentials file path (~/.config/gazette/google-credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Settings for the summarization service
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// API key; summaries degrade to an inline error when absent
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Runtime settings for the newsletter service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub token_path: PathBuf,
    pub folder_config_path: PathBuf,
    /// Address the HTTP server binds to
    pub bind: String,
    /// OAuth redirect target (the server's callback endpoint)
    pub redirect_uri: String,
    pub allowed_origins: Vec<String>,
    /// Upper bound on messages listed per ingestion or live search
    pub max_messages: usize,
    /// Per-request timeout for outbound HTTP calls
    pub http_timeout: Duration,
    /// Attempts per outbound call, including the first
    pub http_retries: u32,
    pub summarizer: SummarizerConfig,
}

impl ServiceConfig {
    /// Build the config rooted at `dir` with every other setting defaulted
    pub fn with_dir(dir: &Path) -> Self {
        Self {
            db_path: dir.join("mail.sqlite"),
            token_path: dir.join(TOKEN_FILE),
            folder_config_path: dir.join(FOLDER_CONFIG_FILE),
            bind: "127.0.0.1:8000".to_string(),
            redirect_uri: "http://localhost:8000/api/auth/callback".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_messages: 100,
            http_timeout: Duration::from_secs(30),
            http_retries: 3,
            summarizer: SummarizerConfig::default(),
        }
    }

    /// Load settings from the environment, rooted at the Gazette config directory
    pub fn from_env() -> Result<Self> {
        let dir = config::ensure_config_dir()?;
        Self::from_lookup(&dir, |key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(dir: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::with_dir(dir);

        if let Some(path) = var("GAZETTE_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(bind) = var("GAZETTE_BIND") {
            cfg.bind = bind;
        }
        if let Some(uri) = var("GAZETTE_REDIRECT_URI") {
            cfg.redirect_uri = uri;
        }
        if let Some(origins) = var("GAZETTE_ALLOWED_ORIGINS") {
            cfg.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(max) = var("GAZETTE_MAX_MESSAGES") {
            cfg.max_messages = max
                .parse()
                .with_context(|| format!("Invalid GAZETTE_MAX_MESSAGES: {}", max))?;
        }
        if let Some(secs) = var("GAZETTE_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("Invalid GAZETTE_HTTP_TIMEOUT_SECS: {}", secs))?;
            cfg.http_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = var("GAZETTE_HTTP_RETRIES") {
            cfg.http_retries = retries
                .parse::<u32>()
                .with_context(|| format!("Invalid GAZETTE_HTTP_RETRIES: {}", retries))?
                .max(1);
        }

        cfg.summarizer.api_key = var("OPENAI_API_KEY");
        if let Some(model) = var("OPENAI_MODEL") {
            cfg.summarizer.model = model;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            cfg.summarizer.base_url = url.trim_end_matches('/').to_string();
        }

        Ok(cfg)
    }
}
