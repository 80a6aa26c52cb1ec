#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `state` missing, unknown, mismatched, or its pending record has expired.
    #[error("login state is missing, unknown or expired")]
    InvalidState,
    #[error("authorization code missing from callback")]
    MissingAuthorizationCode,
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    #[error("invalid dollar amount: {0:?}")]
    InvalidAmount(String),
    #[error("session expired")]
    SessionExpired,
    /// The provider redirected back with `error=...` instead of a code.
    #[error("authorization denied by provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },
    #[error("provider discovery failed: {0}")]
    Discovery(String),
    #[error("OAuth2 error during {operation} (status {status:?}): {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token verification error: {0}")]
    Token(String),
    #[error("token expired")]
    TokenExpired,
    #[error("configuration error: {0}")]
    Config(String),
}
