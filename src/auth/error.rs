use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Stored credential has no refresh token")]
    MissingRefreshToken,

    #[error("Token request to {0} failed")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Token endpoint {url} answered with status {status}: {body}")]
    TokenEndpoint {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode token response from {0}")]
    InvalidTokenResponse(String, #[source] reqwest::Error),

    #[error("Access token cannot be used as a header value")]
    InvalidAccessToken,

    #[error("Failed to build authorization URL: {0}")]
    InvalidAuthorizeUrl(String),

    #[error("No authorization code was entered")]
    EmptyAuthorizationCode,

    #[error("Failed to read the authorization code")]
    Prompt(#[source] std::io::Error),

    #[error("Failed to read token file '{0}'")]
    TokenRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode token file '{0}'")]
    TokenDecode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to write token file '{0}'")]
    TokenWrite(PathBuf, #[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Failure of a request sent through [`crate::HttpSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to authenticate request")]
    Auth(#[from] AuthError),

    #[error("Failed to build request")]
    Build(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),
}
