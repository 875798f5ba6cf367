//! The shared HTTP session every component sends its requests through, and the
//! [`AuthSession`] that decides whether it carries a bearer credential.

use crate::auth::authorizer::RefreshTokenAuthorizer;
use crate::auth::error::{AuthError, SessionError};
use crate::auth::native_flow::{self, AuthorizationPrompt, StdinPrompt};
use crate::auth::oauth::OAuthClient;
use crate::auth::token_store::TokenStore;
use crate::types::config::AuthEndpoints;
use log::info;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable overriding the configured client id.
pub const ENV_CLIENT_ID: &str = "ESGF_GLOBUS_CLIENT_ID";
/// Environment variable overriding the configured scopes (whitespace separated).
pub const ENV_SCOPES: &str = "ESGF_GLOBUS_SCOPES";

pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "urn:globus:auth:scope:search.api.globus.org:search",
];

/// An HTTP client plus an optional credential.
///
/// Every request goes through [`HttpSession::send`], which attaches a fresh bearer token
/// when the session is authenticated. Cloning is cheap and clones share the credential.
#[derive(Clone)]
pub struct HttpSession {
    client: Client,
    authorizer: Option<Arc<RefreshTokenAuthorizer>>,
}

impl HttpSession {
    /// A session for public endpoints.
    pub fn anonymous(client: Client) -> Self {
        Self {
            client,
            authorizer: None,
        }
    }

    pub fn authenticated(client: Client, authorizer: Arc<RefreshTokenAuthorizer>) -> Self {
        Self {
            client,
            authorizer: Some(authorizer),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authorizer.is_some()
    }

    pub fn authorizer(&self) -> Option<&Arc<RefreshTokenAuthorizer>> {
        self.authorizer.as_ref()
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn head(&self, url: &str) -> RequestBuilder {
        self.client.head(url)
    }

    /// Sends a request built from [`HttpSession::get`] or [`HttpSession::head`].
    ///
    /// # Errors
    ///
    /// [`SessionError::Auth`] when the token could not be refreshed; the request is not
    /// sent in that case.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, SessionError> {
        let mut request = request.build().map_err(SessionError::Build)?;
        if let Some(authorizer) = &self.authorizer {
            let value = authorizer.authorization_value().await?;
            let mut header =
                HeaderValue::from_str(&value).map_err(|_| AuthError::InvalidAccessToken)?;
            header.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, header);
        }
        let url = request.url().to_string();
        self.client
            .execute(request)
            .await
            .map_err(|e| SessionError::NetworkRequest(url, e))
    }
}

/// Inputs for building an authenticated session.
#[derive(Debug, Clone, bon::Builder)]
pub struct AuthSettings {
    /// Client id from configuration; the environment may override it.
    #[builder(into)]
    pub client_id: Option<String>,
    #[builder(default)]
    pub scopes: Vec<String>,
    #[builder(default)]
    pub endpoints: AuthEndpoints,
    #[builder(into)]
    pub token_path: PathBuf,
}

impl AuthSettings {
    /// The environment value wins over the configured id. Blank values count as unset.
    pub fn resolve_client_id(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.client_id.clone())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Environment scopes, else configured scopes, else [`DEFAULT_SCOPES`].
    pub fn resolve_scopes(&self, env_value: Option<String>) -> Vec<String> {
        if let Some(env_scopes) = env_value {
            let scopes: Vec<String> = env_scopes.split_whitespace().map(str::to_string).collect();
            if !scopes.is_empty() {
                return scopes;
            }
        }
        if !self.scopes.is_empty() {
            return self.scopes.clone();
        }
        DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
    }
}

/// Builds the [`HttpSession`] used by the catalog client and the transfers.
pub struct AuthSession {
    settings: AuthSettings,
    client: Client,
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl AuthSession {
    pub fn new(settings: AuthSettings, client: Client) -> Self {
        Self {
            settings,
            client,
            prompt: Arc::new(StdinPrompt),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Builds an authenticated session, reading overrides from the process environment.
    ///
    /// Returns `Ok(None)` when no client id is configured: authentication is disabled and
    /// callers should use [`HttpSession::anonymous`].
    pub async fn build(&self) -> Result<Option<HttpSession>, AuthError> {
        self.build_with_env(
            std::env::var(ENV_CLIENT_ID).ok(),
            std::env::var(ENV_SCOPES).ok(),
        )
        .await
    }

    /// Like [`AuthSession::build`], with explicit override values.
    pub async fn build_with_env(
        &self,
        env_client_id: Option<String>,
        env_scopes: Option<String>,
    ) -> Result<Option<HttpSession>, AuthError> {
        let Some(client_id) = self.settings.resolve_client_id(env_client_id) else {
            info!("No credential issuer configured; requests are sent unauthenticated");
            return Ok(None);
        };
        let scopes = self.settings.resolve_scopes(env_scopes);
        let oauth = OAuthClient::new(
            self.client.clone(),
            client_id,
            self.settings.endpoints.clone(),
        );
        let store = TokenStore::new(self.settings.token_path.clone());

        let credential = match store.load().await? {
            Some(stored) if stored.can_refresh() => {
                info!("Using stored credential from {}", store.path().display());
                stored
            }
            _ => {
                let issued = native_flow::login(&oauth, &scopes, self.prompt.clone()).await?;
                store.save(&issued).await?;
                issued
            }
        };

        let authorizer = RefreshTokenAuthorizer::new(oauth, store, credential);
        Ok(Some(HttpSession::authenticated(
            self.client.clone(),
            Arc::new(authorizer),
        )))
    }

    /// The authenticated session, or an anonymous one when authentication is disabled.
    pub async fn session(&self) -> Result<HttpSession, AuthError> {
        Ok(self
            .build()
            .await?
            .unwrap_or_else(|| HttpSession::anonymous(self.client.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::token::TokenCredential;
    use chrono::Utc;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io;

    struct PanicPrompt;

    impl AuthorizationPrompt for PanicPrompt {
        fn obtain_code(&self, _authorize_url: &reqwest::Url) -> io::Result<String> {
            panic!("interactive login must not run when a credential is stored");
        }
    }

    struct CodePrompt;

    impl AuthorizationPrompt for CodePrompt {
        fn obtain_code(&self, _authorize_url: &reqwest::Url) -> io::Result<String> {
            Ok("the-code".to_string())
        }
    }

    fn settings(server: &MockServer, token_path: PathBuf, client_id: Option<&str>) -> AuthSettings {
        AuthSettings::builder()
            .maybe_client_id(client_id)
            .endpoints(AuthEndpoints::builder().base_url(server.base_url()).build())
            .token_path(token_path)
            .build()
    }

    #[test]
    fn test_client_id_resolution_prefers_environment() {
        let settings = AuthSettings::builder()
            .client_id("from-config")
            .token_path("/tmp/t.json")
            .build();
        assert_eq!(
            settings.resolve_client_id(Some("from-env".to_string())).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            settings.resolve_client_id(Some("  ".to_string())).as_deref(),
            Some("from-config")
        );
        let none = AuthSettings::builder().token_path("/tmp/t.json").build();
        assert_eq!(none.resolve_client_id(None), None);
    }

    #[test]
    fn test_scope_resolution_order() {
        let configured = AuthSettings::builder()
            .scopes(vec!["openid".to_string()])
            .token_path("/tmp/t.json")
            .build();
        assert_eq!(
            configured.resolve_scopes(Some("a b\tc".to_string())),
            vec!["a", "b", "c"]
        );
        assert_eq!(configured.resolve_scopes(None), vec!["openid"]);

        let bare = AuthSettings::builder().token_path("/tmp/t.json").build();
        assert_eq!(bare.resolve_scopes(None).len(), DEFAULT_SCOPES.len());
    }

    #[tokio::test]
    async fn test_no_client_id_disables_auth() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthSession::new(
            settings(&server, dir.path().join("t.json"), None),
            Client::new(),
        )
        .with_prompt(Arc::new(PanicPrompt));
        assert!(auth.build_with_env(None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_credential_skips_login_and_attaches_bearer() {
        let server = MockServer::start_async().await;
        let data = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/data")
                    .header("authorization", "Bearer stored-access");
                then.status(200).body("ok");
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("t.json");
        TokenStore::new(&token_path)
            .save(&TokenCredential {
                resource_server: "auth.globus.org".to_string(),
                access_token: "stored-access".to_string(),
                refresh_token: Some("r".to_string()),
                expires_at: Some(Utc::now().timestamp() + 3600),
                token_type: "Bearer".to_string(),
            })
            .await
            .unwrap();

        let auth = AuthSession::new(settings(&server, token_path, Some("cid")), Client::new())
            .with_prompt(Arc::new(PanicPrompt));
        let session = auth.build_with_env(None, None).await.unwrap().unwrap();
        assert!(session.is_authenticated());

        let response = session.send(session.get(&server.url("/data"))).await.unwrap();
        assert_eq!(response.status(), 200);
        data.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credential_runs_login_and_persists() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/oauth2/token")
                    .body_includes("code=the-code");
                then.status(200).json_body(json!({
                    "access_token": "issued",
                    "refresh_token": "r-issued",
                    "expires_in": 3600,
                    "resource_server": "auth.globus.org"
                }));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("cache").join("t.json");

        let auth = AuthSession::new(
            settings(&server, token_path.clone(), None),
            Client::new(),
        )
        .with_prompt(Arc::new(CodePrompt));
        let session = auth
            .build_with_env(Some("env-client".to_string()), None)
            .await
            .unwrap();
        assert!(session.is_some());

        let stored = TokenStore::new(token_path).load().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "issued");
        assert_eq!(stored.refresh_token.as_deref(), Some("r-issued"));
    }

    #[tokio::test]
    async fn test_refresh_failure_blocks_the_request() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/oauth2/token");
                then.status(400).body("invalid_grant");
            })
            .await;
        let data = server
            .mock_async(|when, then| {
                when.method(GET).path("/data");
                then.status(200);
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("t.json");
        TokenStore::new(&token_path)
            .save(&TokenCredential {
                resource_server: "auth.globus.org".to_string(),
                access_token: "expired".to_string(),
                refresh_token: Some("r".to_string()),
                expires_at: Some(0),
                token_type: "Bearer".to_string(),
            })
            .await
            .unwrap();

        let auth = AuthSession::new(settings(&server, token_path, Some("cid")), Client::new())
            .with_prompt(Arc::new(PanicPrompt));
        let session = auth.build_with_env(None, None).await.unwrap().unwrap();
        let result = session.send(session.get(&server.url("/data"))).await;

        assert!(matches!(result, Err(SessionError::Auth(AuthError::TokenEndpoint { .. }))));
        assert_eq!(data.hits_async().await, 0);
    }
}
