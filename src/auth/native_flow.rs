//! Interactive native-app login (authorization code with PKCE).
//!
//! The user opens the authorize URL in a browser, logs in, and pastes the code the issuer
//! displays back into the prompt.

use crate::auth::error::AuthError;
use crate::auth::oauth::OAuthClient;
use crate::types::token::TokenCredential;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Source of the authorization code the user copies from the issuer's page.
pub trait AuthorizationPrompt: Send + Sync {
    /// Shows `authorize_url` to the user and returns the code they enter.
    fn obtain_code(&self, authorize_url: &Url) -> io::Result<String>;
}

/// Prompts on stdout and reads the code from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl AuthorizationPrompt for StdinPrompt {
    fn obtain_code(&self, authorize_url: &Url) -> io::Result<String> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "ESGF/Globus login required.")?;
        writeln!(stdout, "1) Open this URL in a browser:\n   {authorize_url}\n")?;
        write!(stdout, "2) Paste the authorization code here: ")?;
        stdout.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Builds the URL the user must visit to grant access for `scopes`.
pub(crate) fn authorize_url(
    oauth: &OAuthClient,
    scopes: &[String],
    pkce: &PkcePair,
) -> Result<Url, AuthError> {
    let endpoints = oauth.endpoints();
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &endpoints.authorize_url(),
        &[
            ("client_id", oauth.client_id()),
            ("redirect_uri", endpoints.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", "_default"),
            ("response_type", "code"),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
        ],
    )
    .map_err(|e| AuthError::InvalidAuthorizeUrl(e.to_string()))
}

/// Runs the interactive login and returns the issued credential (not yet persisted).
pub async fn login(
    oauth: &OAuthClient,
    scopes: &[String],
    prompt: Arc<dyn AuthorizationPrompt>,
) -> Result<TokenCredential, AuthError> {
    let pkce = PkcePair::generate();
    let url = authorize_url(oauth, scopes, &pkce)?;
    info!("Starting interactive login for client {}", oauth.client_id());

    let code = tokio::task::spawn_blocking(move || prompt.obtain_code(&url))
        .await?
        .map_err(AuthError::Prompt)?;
    if code.is_empty() {
        return Err(AuthError::EmptyAuthorizationCode);
    }

    oauth.exchange_code(&code, &pkce.verifier).await
}
