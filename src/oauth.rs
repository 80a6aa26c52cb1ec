use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::discovery::{MetadataResolver, ProviderMetadata};
use crate::error::Error;
use crate::pkce;
use crate::types::{PendingExchange, UserClaims};

/// OpenID Connect client registration.
///
/// Required fields are constructor parameters; optional ones use `with_*`.
///
/// ```rust,ignore
/// use changebank::OAuthConfig;
///
/// let config = OAuthConfig::new(
///     "https://auth.example.com".parse()?,
///     "e9fdb985-9173-4e01-9d73-ac2d60d1dc8e",
///     "http://localhost:5000/callback".parse()?,
/// )
/// .with_client_secret("super-secret");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) issuer: Url,
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<String>,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
}

impl OAuthConfig {
    #[must_use]
    pub fn new(issuer: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
            scopes: vec!["openid".into(), "offline_access".into()],
        }
    }

    /// Confidential-client secret. Without it the exchange relies on PKCE alone.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the scopes (default: `["openid", "offline_access"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Provider end-session URL: `{issuer}/oauth2/logout?client_id=...`.
#[must_use]
pub fn logout_url(issuer: &str, client_id: &str) -> String {
    let client_id: String = url::form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
    format!(
        "{}/oauth2/logout?client_id={client_id}",
        issuer.trim_end_matches('/')
    )
}

/// Redirect target plus the record that must survive until `/callback`.
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub pending: PendingExchange,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Relying-party client for one provider registration.
pub struct AuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
    metadata: Arc<MetadataResolver>,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        let http = reqwest::Client::new();
        let metadata = Arc::new(MetadataResolver::for_issuer(&config.issuer, http.clone()));
        Self {
            config,
            http,
            metadata,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.metadata = Arc::new(MetadataResolver::for_issuer(
            &self.config.issuer,
            client.clone(),
        ));
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Shared metadata resolver, also used by the JWKS-backed validator.
    #[must_use]
    pub fn metadata_resolver(&self) -> Arc<MetadataResolver> {
        self.metadata.clone()
    }

    /// Provider metadata, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the discovery document is unavailable.
    pub async fn metadata(&self) -> Result<Arc<ProviderMetadata>, Error> {
        self.metadata.get().await
    }

    #[must_use]
    pub fn logout_url(&self) -> String {
        logout_url(self.config.issuer.as_str(), &self.config.client_id)
    }

    /// Fresh authorization redirect with new PKCE and state values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the authorization endpoint is unknown.
    pub async fn authorization_request(&self) -> Result<AuthorizationRequest, Error> {
        let metadata = self.metadata().await?;
        Ok(self.authorization_request_for(&metadata))
    }

    /// Same as [`authorization_request`](AuthClient::authorization_request) with
    /// metadata supplied by the caller.
    #[must_use]
    pub fn authorization_request_for(&self, metadata: &ProviderMetadata) -> AuthorizationRequest {
        let state = pkce::generate_state();
        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::code_challenge(&code_verifier);
        let scope = self.config.scopes.join(" ");

        let mut url = metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        AuthorizationRequest {
            url: url.into(),
            pending: PendingExchange::new(state, code_verifier),
        }
    }

    /// Exchange an authorization code for tokens using PKCE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::OAuth`] if the token endpoint returns an error.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        self.token_request(&params, "token exchange").await
    }

    /// Trade a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Same as [`exchange_code`](AuthClient::exchange_code).
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        self.token_request(&params, "token refresh").await
    }

    /// Claims for the new session.
    ///
    /// Uses the userinfo endpoint when the provider advertises one, otherwise
    /// the unverified `id_token` payload, otherwise no claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::OAuth`] if the userinfo call fails,
    /// [`Error::Token`] if the `id_token` is malformed.
    pub async fn user_claims(&self, tokens: &TokenResponse) -> Result<UserClaims, Error> {
        let metadata = self.metadata().await?;

        if let Some(userinfo_url) = &metadata.userinfo_endpoint {
            let response = self
                .http
                .get(userinfo_url.clone())
                .bearer_auth(&tokens.access_token)
                .send()
                .await?;
            let response = Self::ensure_success(response, "userinfo request").await?;
            return Ok(response.json::<UserClaims>().await?);
        }

        match &tokens.id_token {
            Some(id_token) => decode_unverified_claims(id_token),
            None => Ok(UserClaims::default()),
        }
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let metadata = self.metadata().await?;

        let response = self
            .http
            .post(metadata.token_endpoint.clone())
            .form(params)
            .send()
            .await?;

        let response = Self::ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

/// Reads the payload segment of a JWT without checking its signature.
pub(crate) fn decode_unverified_claims(token: &str) -> Result<UserClaims, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::Token("malformed JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Token(format!("JWT payload: {e}")))?;
    let claims: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|e| Error::Token(format!("JWT payload: {e}")))?;
    Ok(UserClaims(claims))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OAuthConfig {
        OAuthConfig::new(
            "https://auth.example.com".parse().unwrap(),
            "test-client",
            "http://localhost:5000/callback".parse().unwrap(),
        )
    }

    fn test_metadata() -> ProviderMetadata {
        serde_json::from_value(serde_json::json!({
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/oauth2/authorize",
            "token_endpoint": "https://auth.example.com/oauth2/token",
        }))
        .unwrap()
    }

    fn query(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_authorization_url_contains_pkce() {
        let client = AuthClient::new(test_config());
        let req = client.authorization_request_for(&test_metadata());
        let pairs = query(&req.url);

        assert!(req.url.starts_with("https://auth.example.com/oauth2/authorize?"));
        assert_eq!(param(&pairs, "response_type"), Some("code"));
        assert_eq!(param(&pairs, "client_id"), Some("test-client"));
        assert_eq!(
            param(&pairs, "redirect_uri"),
            Some("http://localhost:5000/callback")
        );
        assert_eq!(param(&pairs, "scope"), Some("openid offline_access"));
        assert_eq!(param(&pairs, "code_challenge_method"), Some("S256"));
        assert_eq!(param(&pairs, "state"), Some(req.pending.state.as_str()));
    }

    #[test]
    fn test_challenge_derived_from_stored_verifier() {
        let client = AuthClient::new(test_config());
        let req = client.authorization_request_for(&test_metadata());
        let pairs = query(&req.url);

        let challenge = param(&pairs, "code_challenge").unwrap();
        assert!(pkce::verify_challenge(&req.pending.code_verifier, challenge));
    }

    #[test]
    fn test_authorization_request_unique_per_call() {
        let client = AuthClient::new(test_config());
        let req1 = client.authorization_request_for(&test_metadata());
        let req2 = client.authorization_request_for(&test_metadata());

        assert_ne!(req1.pending.state, req2.pending.state);
        assert_ne!(req1.pending.code_verifier, req2.pending.code_verifier);
    }

    #[test]
    fn test_logout_url_encodes_client_id() {
        assert_eq!(
            logout_url("https://auth.example.com/", "my app&co"),
            "https://auth.example.com/oauth2/logout?client_id=my+app%26co"
        );
        let client = AuthClient::new(test_config());
        assert_eq!(
            client.logout_url(),
            "https://auth.example.com/oauth2/logout?client_id=test-client"
        );
    }

    #[test]
    fn test_config_with_overrides() {
        let config = test_config()
            .with_client_secret("shh")
            .with_scopes(vec!["openid".into(), "email".into()]);

        assert_eq!(config.client_secret.as_deref(), Some("shh"));
        assert_eq!(config.scopes(), &["openid", "email"]);
    }

    #[test]
    fn test_decode_unverified_claims() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"u-1","email":"a@example.com"}"#);
        let token = format!("eyJhbGciOiJub25lIn0.{payload}.sig");
        let claims = decode_unverified_claims(&token).unwrap();
        assert_eq!(claims.subject(), Some("u-1"));
        assert_eq!(claims.email(), Some("a@example.com"));

        assert!(matches!(
            decode_unverified_claims("not-a-jwt"),
            Err(Error::Token(_))
        ));
    }

    #[test]
    fn test_token_response_optional_fields() {
        let tokens: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at","token_type":"Bearer"}"#).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.expires_in, None);
        assert_eq!(tokens.refresh_token, None);
    }
}
