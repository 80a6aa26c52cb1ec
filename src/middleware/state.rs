use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::AuthSettings;
use crate::oauth::AuthClient;
use crate::token::TokenValidator;

/// Shared state for route handlers and the guard.
pub(super) struct AppState<V> {
    pub(super) client: Arc<AuthClient>,
    pub(super) validator: Arc<V>,
    pub(super) settings: AuthSettings,
}

// Manual Clone: avoid derive adding a `V: Clone` bound.
impl<V> Clone for AppState<V> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            validator: self.validator.clone(),
            settings: self.settings.clone(),
        }
    }
}

// Private and signed cookie jars require Key to be extractable from state
impl<V: TokenValidator> FromRef<AppState<V>> for Key {
    fn from_ref(state: &AppState<V>) -> Self {
        state.settings.cookie_key.clone()
    }
}
