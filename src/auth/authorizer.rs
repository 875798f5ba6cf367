use crate::auth::error::AuthError;
use crate::auth::oauth::OAuthClient;
use crate::auth::token_store::TokenStore;
use crate::types::token::TokenCredential;
use log::info;
use tokio::sync::Mutex;

/// Keeps one credential valid and hands out its bearer header.
///
/// All callers share a single mutex around the credential, so at most one refresh is in
/// flight and the token file is written by one task at a time.
pub struct RefreshTokenAuthorizer {
    oauth: OAuthClient,
    store: TokenStore,
    credential: Mutex<TokenCredential>,
}

impl RefreshTokenAuthorizer {
    pub fn new(oauth: OAuthClient, store: TokenStore, credential: TokenCredential) -> Self {
        Self {
            oauth,
            store,
            credential: Mutex::new(credential),
        }
    }

    /// Returns the `Authorization` header value, refreshing the access token first if it
    /// has expired.
    ///
    /// # Errors
    ///
    /// Any refresh or persistence failure is returned as-is; no stale token is handed out.
    pub async fn authorization_value(&self) -> Result<String, AuthError> {
        let mut credential = self.credential.lock().await;
        if credential.is_stale() {
            self.refresh_locked(&mut credential).await?;
        }
        Ok(credential.authorization_value())
    }

    /// Forces a refresh regardless of expiry.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let mut credential = self.credential.lock().await;
        self.refresh_locked(&mut credential).await
    }

    /// Snapshot of the current credential.
    pub async fn credential(&self) -> TokenCredential {
        self.credential.lock().await.clone()
    }

    async fn refresh_locked(&self, credential: &mut TokenCredential) -> Result<(), AuthError> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;

        let updated = self
            .oauth
            .refresh(&refresh_token, &credential.resource_server)
            .await?;
        // Persist before the new token is used anywhere.
        self.store.save(&updated).await?;
        *credential = updated;
        info!(
            "Refreshed access token for {} (expires at {:?})",
            credential.resource_server, credential.expires_at
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::AuthEndpoints;
    use chrono::Utc;
    use httpmock::prelude::*;
    use reqwest::Client;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    fn authorizer(server: &MockServer, store: TokenStore, expires_at: i64) -> RefreshTokenAuthorizer {
        let endpoints = AuthEndpoints::builder().base_url(server.base_url()).build();
        let oauth = OAuthClient::new(Client::new(), "client-123", endpoints);
        let credential = TokenCredential {
            resource_server: "auth.globus.org".to_string(),
            access_token: "old-access".to_string(),
            refresh_token: Some("r-1".to_string()),
            expires_at: Some(expires_at),
            token_type: "Bearer".to_string(),
        };
        RefreshTokenAuthorizer::new(oauth, store, credential)
    }

    #[tokio::test]
    async fn test_valid_token_is_used_without_refresh() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/oauth2/token");
                then.status(500);
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let auth = authorizer(&server, store.clone(), Utc::now().timestamp() + 3600);

        assert_eq!(auth.authorization_value().await.unwrap(), "Bearer old-access");
        assert_eq!(mock.hits_async().await, 0);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_and_persists() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/oauth2/token");
                then.status(200)
                    .delay(std::time::Duration::from_millis(50))
                    .json_body(json!({
                        "access_token": "new-access",
                        "expires_in": 3600,
                        "resource_server": "auth.globus.org"
                    }));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let auth = Arc::new(authorizer(&server, store.clone(), 0));

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let auth = auth.clone();
            tasks.spawn(async move { auth.authorization_value().await });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap(), "Bearer new-access");
        }

        assert_eq!(mock.hits_async().await, 1);
        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted.access_token, "new-access");
        // The response carried no refresh token, so the old one is kept.
        assert_eq!(persisted.refresh_token.as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_refresh_without_expiry_is_reused() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/oauth2/token");
                then.status(200).json_body(json!({
                    "access_token": "new-access",
                    "resource_server": "auth.globus.org"
                }));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let auth = authorizer(&server, store, 0);

        assert_eq!(auth.authorization_value().await.unwrap(), "Bearer new-access");
        assert_eq!(auth.authorization_value().await.unwrap(), "Bearer new-access");
        assert_eq!(mock.hits_async().await, 1);
        assert!(auth.credential().await.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/oauth2/token");
                then.status(401).body("revoked");
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let auth = authorizer(&server, store, 0);

        let result = auth.authorization_value().await;
        assert!(matches!(result, Err(AuthError::TokenEndpoint { .. })));
        assert_eq!(auth.credential().await.access_token, "old-access");
    }
}
