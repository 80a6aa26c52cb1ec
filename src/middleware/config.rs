use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use url::Url;

use crate::error::Error;
use crate::oauth::{AuthClient, OAuthConfig};

const DEFAULT_PORT: u16 = 5000;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) cookie_path: String,
    pub(crate) secure_cookies: bool,
    pub(crate) expose_claims_to_script: bool,
    pub(crate) pending_ttl_secs: u64,
    pub(crate) default_session_ttl_secs: u64,
    pub(crate) login_redirect: String,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            cookie_path: "/".into(),
            secure_cookies: true,
            expose_claims_to_script: true,
            pending_ttl_secs: 300,
            default_session_ttl_secs: 3600,
            login_redirect: "/".into(),
        }
    }
}

/// Relying-party configuration.
///
/// Required field (`client`) is a constructor parameter.
///
/// Use [`from_env()`](AuthConfig::from_env) for the standard environment setup,
/// or [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(super) client: AuthClient,
    pub(super) settings: AuthSettings,
    pub(super) port: u16,
}

impl AuthConfig {
    /// Create config with the required `AuthClient`.
    ///
    /// All optional fields use sensible defaults. Override with `with_*` methods.
    #[must_use]
    pub fn new(client: AuthClient) -> Self {
        Self {
            client,
            settings: AuthSettings::defaults(),
            port: DEFAULT_PORT,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ISSUER`: provider base URL (discovery lives under it)
    /// - `CLIENT_ID`: registered application id
    /// - `APP_SECRET_KEY`: secret the cookie signing/encryption key is derived from
    ///
    /// # Optional env vars
    /// - `CLIENT_SECRET`: confidential-client secret (PKCE-only without it)
    /// - `PORT`: listen port, default 5000. The redirect URI is
    ///   `http://localhost:{PORT}/callback`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let issuer = required("ISSUER")?;
        let issuer: Url = issuer
            .parse()
            .map_err(|e| Error::Config(format!("ISSUER: {e}")))?;
        let client_id = required("CLIENT_ID")?;
        let secret_key = required("APP_SECRET_KEY")?;

        let port = match std::env::var("PORT") {
            Ok(p) => p
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("PORT: {e}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let redirect_uri: Url = format!("http://localhost:{port}/callback")
            .parse()
            .map_err(|e| Error::Config(format!("redirect URI: {e}")))?;
        let secure = redirect_uri.scheme() == "https";

        let mut oauth = OAuthConfig::new(issuer, client_id, redirect_uri);
        if let Ok(secret) = std::env::var("CLIENT_SECRET") {
            if !secret.is_empty() {
                oauth = oauth.with_client_secret(secret);
            }
        }

        Ok(Self::new(AuthClient::new(oauth))
            .with_cookie_key(derive_cookie_key(&secret_key)?)
            .with_secure_cookies(secure)
            .with_port(port))
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.settings.cookie_path = path.into();
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Whether browser scripts may read the user-claims cookie (default `true`).
    ///
    /// The claims are signed but not secret; `false` marks the cookie HttpOnly.
    #[must_use]
    pub fn with_expose_claims_to_script(mut self, expose: bool) -> Self {
        self.settings.expose_claims_to_script = expose;
        self
    }

    /// Lifetime of an unfinished login (default 300 seconds).
    #[must_use]
    pub fn with_pending_ttl_secs(mut self, secs: u64) -> Self {
        self.settings.pending_ttl_secs = secs;
        self
    }

    /// Session lifetime when the provider omits `expires_in` (default 3600 seconds).
    #[must_use]
    pub fn with_default_session_ttl_secs(mut self, secs: u64) -> Self {
        self.settings.default_session_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = path.into();
        self
    }
}

fn required(name: &str) -> Result<String, Error> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{name} is required")))
}

/// Expands an arbitrary-length application secret into a 64-byte cookie key.
pub(crate) fn derive_cookie_key(secret: &str) -> Result<Key, Error> {
    let digest = Sha512::digest(secret.as_bytes());
    Key::try_from(digest.as_slice())
        .map_err(|_| Error::Config("APP_SECRET_KEY could not be turned into a cookie key".into()))
}
