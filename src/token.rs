use std::future::Future;

use serde_json::Value;

use crate::error::Error;

#[cfg(feature = "jwt")]
pub use jwt::JwtValidator;

/// Decides whether an access token still authorizes the session.
///
/// The route guard calls this on every protected request. Returning
/// [`Error::TokenExpired`] lets the guard try a refresh before giving up;
/// any other error sends the browser through provider logout.
///
/// # Example
///
/// ```rust,ignore
/// struct Introspect { /* ... */ }
///
/// impl TokenValidator for Introspect {
///     async fn validate(&self, token: &str) -> Result<serde_json::Value, Error> {
///         self.call_introspection_endpoint(token).await
///     }
/// }
/// ```
pub trait TokenValidator: Send + Sync + 'static {
    /// Returns the token's verified claims (or `Value::Null` if the
    /// validator does not inspect them).
    fn validate(&self, token: &str) -> impl Future<Output = Result<Value, Error>> + Send;
}

/// Accepts any non-empty token without inspecting it.
///
/// Presence of the cookie is the only check. Suitable for local development
/// against a provider whose keys are not reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceValidator;

impl TokenValidator for PresenceValidator {
    async fn validate(&self, token: &str) -> Result<Value, Error> {
        if token.trim().is_empty() {
            return Err(Error::Token("empty access token".into()));
        }
        Ok(Value::Null)
    }
}

#[cfg(feature = "jwt")]
mod jwt {
    use std::collections::HashMap;
    use std::sync::Arc;

    use jsonwebtoken::errors::ErrorKind;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
    use serde::Deserialize;
    use serde_json::Value;
    use tokio::sync::RwLock;

    use super::TokenValidator;
    use crate::discovery::MetadataResolver;
    use crate::error::Error;

    #[derive(Debug, Clone, Deserialize)]
    struct Jwk {
        kid: Option<String>,
        kty: String,
        #[serde(default)]
        n: Option<String>,
        #[serde(default)]
        e: Option<String>,
    }

    impl Jwk {
        fn decoding_key(&self) -> Result<DecodingKey, Error> {
            match (self.kty.as_str(), &self.n, &self.e) {
                ("RSA", Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| Error::Token(format!("bad RSA key: {err}"))),
                ("RSA", _, _) => Err(Error::Token("RSA key missing 'n' or 'e'".into())),
                (other, _, _) => Err(Error::Token(format!("unsupported key type: {other}"))),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    struct JwksResponse {
        keys: Vec<Jwk>,
    }

    /// Provider signing keys by `kid`, refetched when an unknown `kid` shows up.
    struct JwksCache {
        metadata: Arc<MetadataResolver>,
        http: reqwest::Client,
        keys: RwLock<HashMap<String, Jwk>>,
    }

    impl JwksCache {
        async fn key(&self, kid: &str) -> Result<DecodingKey, Error> {
            if let Some(jwk) = self.keys.read().await.get(kid) {
                return jwk.decoding_key();
            }

            self.refresh().await?;

            self.keys
                .read()
                .await
                .get(kid)
                .ok_or_else(|| Error::Token(format!("unknown key id: {kid}")))?
                .decoding_key()
        }

        async fn refresh(&self) -> Result<(), Error> {
            let metadata = self.metadata.get().await?;
            let jwks_uri = metadata
                .jwks_uri
                .clone()
                .ok_or_else(|| Error::Discovery("provider advertises no jwks_uri".into()))?;

            tracing::debug!(url = %jwks_uri, "Refreshing provider signing keys");

            let jwks: JwksResponse = self
                .http
                .get(jwks_uri)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let keys = jwks
                .keys
                .into_iter()
                .filter_map(|jwk| jwk.kid.clone().map(|kid| (kid, jwk)))
                .collect();
            *self.keys.write().await = keys;
            Ok(())
        }
    }

    enum KeySource {
        Static(DecodingKey),
        Jwks(JwksCache),
    }

    /// Verifies JWT access tokens: signature, `exp`, `nbf`, `iss` and `aud`.
    ///
    /// Defaults to RS256, the algorithm the provider's generated signing key uses.
    pub struct JwtValidator {
        keys: KeySource,
        issuers: Vec<String>,
        audience: String,
        algorithms: Vec<Algorithm>,
    }

    impl JwtValidator {
        /// Validator with a fixed key (tests, or a pinned provider key).
        #[must_use]
        pub fn with_static_key(
            key: DecodingKey,
            issuer: &str,
            audience: impl Into<String>,
        ) -> Self {
            Self::build(KeySource::Static(key), issuer, audience.into())
        }

        /// Validator that loads keys from the provider's `jwks_uri`.
        #[must_use]
        pub fn with_jwks(
            metadata: Arc<MetadataResolver>,
            http: reqwest::Client,
            issuer: &str,
            audience: impl Into<String>,
        ) -> Self {
            let cache = JwksCache {
                metadata,
                http,
                keys: RwLock::new(HashMap::new()),
            };
            Self::build(KeySource::Jwks(cache), issuer, audience.into())
        }

        #[must_use]
        pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
            self.algorithms = algorithms;
            self
        }

        fn build(keys: KeySource, issuer: &str, audience: String) -> Self {
            // Url normalization may add a trailing slash the provider's `iss` lacks.
            let trimmed = issuer.trim_end_matches('/');
            Self {
                keys,
                issuers: vec![trimmed.to_string(), format!("{trimmed}/")],
                audience,
                algorithms: vec![Algorithm::RS256],
            }
        }
    }

    impl TokenValidator for JwtValidator {
        async fn validate(&self, token: &str) -> Result<Value, Error> {
            let header = decode_header(token)
                .map_err(|e| Error::Token(format!("failed to decode header: {e}")))?;

            if !self.algorithms.contains(&header.alg) {
                return Err(Error::Token(format!(
                    "disallowed JWT algorithm: {:?}",
                    header.alg
                )));
            }

            let key = match &self.keys {
                KeySource::Static(key) => key.clone(),
                KeySource::Jwks(cache) => {
                    let kid = header
                        .kid
                        .as_deref()
                        .ok_or_else(|| Error::Token("JWT header missing 'kid'".into()))?;
                    cache.key(kid).await?
                }
            };

            let mut validation = Validation::new(header.alg);
            validation.algorithms = self.algorithms.clone();
            validation.set_issuer(&self.issuers);
            validation.set_audience(&[&self.audience]);
            validation.validate_nbf = true;

            let data = decode::<Value>(token, &key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::Token(e.to_string()),
            })?;

            Ok(data.claims)
        }
    }

}
