//! Ready-made Axum application for the login flow.
//!
//! Mounts `/login`, `/callback` and `/logout`, keeps the session in cookies,
//! and guards `/account` and `/make-change` with a [`TokenValidator`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use changebank::middleware::{AuthConfig, app_routes};
//! use changebank::JwtValidator;
//!
//! // 1. Configure from environment
//! let config = AuthConfig::from_env()?;
//!
//! // 2. Check access tokens against the provider's published keys
//! let client = config.client();
//! let validator = JwtValidator::with_jwks(
//!     client.metadata_resolver(),
//!     reqwest::Client::new(),
//!     client.config().issuer().as_str(),
//!     client.config().client_id(),
//! );
//!
//! // 3. Serve
//! let app = app_routes(config, validator);
//! ```
//!
//! [`TokenValidator`]: crate::token::TokenValidator

mod config;
mod cookies;
mod error;
mod guard;
mod pages;
mod routes;
mod state;

pub use config::AuthConfig;
pub use cookies::{
    ACCESS_TOKEN_COOKIE_NAME, PKCE_COOKIE_PREFIX, REFRESH_TOKEN_COOKIE_NAME, SessionJar,
    USERINFO_COOKIE_NAME,
};
pub use routes::app_routes;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
