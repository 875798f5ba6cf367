//! Minimal client for the issuer's OAuth2 token endpoint.

use crate::auth::error::AuthError;
use crate::types::config::AuthEndpoints;
use crate::types::token::{TokenCredential, DEFAULT_TOKEN_LIFETIME_SECS};
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

/// Token endpoint response. Only the top-level (first resource server) token is used.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub resource_server: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Flattens the response into a credential.
    ///
    /// A response without a refresh token keeps `previous_refresh_token`, and one without a
    /// resource server keeps `previous_resource_server`. A missing `expires_in` is read as
    /// [`DEFAULT_TOKEN_LIFETIME_SECS`].
    pub fn into_credential(
        self,
        now: i64,
        previous_refresh_token: Option<String>,
        previous_resource_server: Option<&str>,
    ) -> TokenCredential {
        TokenCredential {
            resource_server: self
                .resource_server
                .or_else(|| previous_resource_server.map(str::to_string))
                .unwrap_or_default(),
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh_token),
            expires_at: Some(now + self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

/// A public (native app) OAuth2 client: identified by its client id, no secret.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    endpoints: AuthEndpoints,
}

impl OAuthClient {
    pub fn new(http: Client, client_id: impl Into<String>, endpoints: AuthEndpoints) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            endpoints,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        resource_server: &str,
    ) -> Result<TokenCredential, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        let response = self.post_token(&form).await?;
        Ok(response.into_credential(
            Utc::now().timestamp(),
            Some(refresh_token.to_string()),
            Some(resource_server),
        ))
    }

    /// Exchanges an authorization code obtained through the native app flow.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenCredential, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        let response = self.post_token(&form).await?;
        Ok(response.into_credential(Utc::now().timestamp(), None, None))
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let url = self.endpoints.token_url();
        debug!("Requesting token from {}", url);
        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::NetworkRequest(url.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token endpoint {} answered {}", url, status);
            return Err(AuthError::TokenEndpoint { url, status, body });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::InvalidTokenResponse(url, e))
    }
}
