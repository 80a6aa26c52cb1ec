use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::error::Error;

/// The subset of `/.well-known/openid-configuration` this crate uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

/// Lazily fetches and caches provider metadata for the process lifetime.
///
/// The first caller fetches; later callers share the cached document until
/// [`invalidate`](MetadataResolver::invalidate) is called.
pub struct MetadataResolver {
    discovery_url: Url,
    http: reqwest::Client,
    cached: RwLock<Option<Arc<ProviderMetadata>>>,
    fetch_lock: Mutex<()>,
}

impl MetadataResolver {
    /// Resolver for `{issuer}/.well-known/openid-configuration`.
    #[must_use]
    pub fn for_issuer(issuer: &Url, http: reqwest::Client) -> Self {
        let mut discovery_url = issuer.clone();
        let path = format!(
            "{}/.well-known/openid-configuration",
            issuer.path().trim_end_matches('/')
        );
        discovery_url.set_path(&path);
        discovery_url.set_query(None);
        Self::new(discovery_url, http)
    }

    #[must_use]
    pub fn new(discovery_url: Url, http: reqwest::Client) -> Self {
        Self {
            discovery_url,
            http,
            cached: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    /// Returns the cached metadata, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the document cannot be fetched or parsed.
    pub async fn get(&self) -> Result<Arc<ProviderMetadata>, Error> {
        if let Some(metadata) = self.cached.read().await.as_ref() {
            return Ok(metadata.clone());
        }

        // Serialize fetches so concurrent first requests hit the provider once.
        let _guard = self.fetch_lock.lock().await;
        if let Some(metadata) = self.cached.read().await.as_ref() {
            return Ok(metadata.clone());
        }

        let metadata = Arc::new(self.fetch().await?);
        *self.cached.write().await = Some(metadata.clone());
        Ok(metadata)
    }

    /// Drops the cached document; the next [`get`](MetadataResolver::get) refetches.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn fetch(&self) -> Result<ProviderMetadata, Error> {
        tracing::debug!(url = %self.discovery_url, "Fetching provider metadata");

        let response = self
            .http
            .get(self.discovery_url.clone())
            .send()
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Discovery(e.to_string()))?;

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))
    }
}
