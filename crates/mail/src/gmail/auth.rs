//! Gmail OAuth2 authentication
//!
//! Implements the OAuth2 authorization-code flow without blocking on a
//! human: the caller hands out [`GmailAuth::authorization_url`], the
//! provider redirects back to the server with a code, and the code is
//! exchanged here. Uses synchronous HTTP (ureq) to be executor-agnostic.

use chrono::Utc;
use serde::Deserialize;

use anyhow::Result;

use super::token::{Credential, TokenEndpoint};
use crate::config::GmailCredentials;
use crate::error::MailError;
use crate::http::{self, RetryPolicy};

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

/// OAuth2 client configuration for Gmail
pub struct GmailAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl GmailAuth {
    /// Gmail API OAuth2 endpoints
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Read-only mail access plus basic profile
    const SCOPES: [&'static str; 2] = [
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/userinfo.profile",
    ];

    /// Create a new GmailAuth instance
    ///
    /// # Arguments
    /// * `credentials` - OAuth2 client ID and secret from Google Cloud Console
    /// * `redirect_uri` - Where the provider sends the user back with a code
    pub fn new(
        credentials: GmailCredentials,
        redirect_uri: impl Into<String>,
        agent: ureq::Agent,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            redirect_uri: redirect_uri.into(),
            agent,
            retry,
        }
    }

    fn post_token_form(&self, what: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        http::with_retry_classified(
            &self.retry,
            what,
            || {
                let mut response = self
                    .agent
                    .post(Self::TOKEN_URL)
                    .send_form(form.iter().copied())?;
                response.body_mut().read_json::<TokenResponse>()
            },
            |err, what| match err {
                // The provider answers 400 for a bad code or a revoked refresh token
                ureq::Error::StatusCode(400) | ureq::Error::StatusCode(401) => {
                    MailError::AuthRequired { auth_url: None }
                }
                other => http::classify(other, what),
            },
        )
    }

    fn to_credential(&self, token: TokenResponse, previous_refresh: Option<&str>) -> Credential {
        let scopes = match token.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => Self::SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        Credential {
            access_token: token.access_token,
            // Preserve the refresh token if not returned
            refresh_token: token
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            token_uri: Self::TOKEN_URL.to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expiry: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64)),
        }
    }
}

impl TokenEndpoint for GmailAuth {
    fn authorization_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&Self::SCOPES.join(" ")),
        )
    }

    fn exchange_code(&self, code: &str) -> Result<Credential> {
        let token = self.post_token_form(
            "authorization code exchange",
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )?;
        Ok(self.to_credential(token, None))
    }

    fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or(MailError::AuthRequired { auth_url: None })?;

        let token = self.post_token_form(
            "token refresh",
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )?;
        Ok(self.to_credential(token, Some(refresh_token)))
    }
}
