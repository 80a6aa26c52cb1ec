use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use super::cookies::SessionJar;
use super::state::AppState;
use crate::error::Error;
use crate::token::TokenValidator;
use crate::types::Session;

/// Gates protected routes on a valid session.
///
/// A missing or invalid session is sent to the provider's logout URL, never
/// to a local error page, so the provider's session is torn down as well.
/// An expired access token is refreshed once when a refresh token exists.
/// The handler receives the [`Session`] as a request extension.
pub(super) async fn require_session<V: TokenValidator>(
    State(state): State<AppState<V>>,
    jar: SessionJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(session) = jar.get() else {
        tracing::debug!(path = %request.uri().path(), "No session, redirecting to provider logout");
        return Redirect::to(&state.client.logout_url()).into_response();
    };

    match state.validator.validate(&session.access_token).await {
        Ok(_) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(Error::TokenExpired) if session.refresh_token.is_some() => {
            match refresh(&state, &session).await {
                Ok((refreshed, ttl)) => {
                    tracing::info!(sub = ?refreshed.claims.subject(), "Access token refreshed");
                    let jar = jar.set(&refreshed, ttl, &state.settings);
                    request.extensions_mut().insert(refreshed);
                    (jar, next.run(request).await).into_response()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Token refresh failed");
                    end_session(&state, jar)
                }
            }
        }
        Err(e) => {
            tracing::info!(error = %e, "Session rejected");
            end_session(&state, jar)
        }
    }
}

async fn refresh<V: TokenValidator>(
    state: &AppState<V>,
    session: &Session,
) -> Result<(Session, u64), Error> {
    let refresh_token = session.refresh_token.as_deref().ok_or(Error::SessionExpired)?;
    let tokens = state.client.refresh(refresh_token).await?;
    let ttl = tokens
        .expires_in
        .unwrap_or(state.settings.default_session_ttl_secs);

    let refreshed = Session {
        access_token: tokens.access_token,
        // Providers that do not rotate refresh tokens omit it from the response.
        refresh_token: tokens.refresh_token.or_else(|| session.refresh_token.clone()),
        claims: session.claims.clone(),
    };
    Ok((refreshed, ttl))
}

fn end_session<V: TokenValidator>(state: &AppState<V>, jar: SessionJar) -> Response {
    let jar = jar.clear(&state.settings);
    (jar, Redirect::to(&state.client.logout_url())).into_response()
}
