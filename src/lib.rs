#![doc = include_str!("../README.md")]

pub mod change;
pub mod discovery;
pub mod error;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod oauth;
pub mod pkce;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use change::{Change, make_change};
pub use discovery::{MetadataResolver, ProviderMetadata};
pub use error::Error;
pub use oauth::{AuthClient, AuthorizationRequest, OAuthConfig, TokenResponse, logout_url};
pub use pkce::{code_challenge, generate_code_verifier, generate_state, verify_challenge};
#[cfg(feature = "jwt")]
pub use token::JwtValidator;
pub use token::{PresenceValidator, TokenValidator};
pub use types::{PendingExchange, Session, UserClaims};
