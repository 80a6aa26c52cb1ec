use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Form, Router, middleware};
use serde::Deserialize;

use super::config::AuthConfig;
use super::cookies::SessionJar;
use super::guard::require_session;
use super::pages;
use super::state::AppState;
use crate::change::make_change;
use crate::error::Error;
use crate::token::TokenValidator;
use crate::types::{PendingExchange, Session, unix_now};

/// Create the application router: login flow, logout, and the protected pages.
///
/// `/account` and `/make-change` run behind [`require_session`], which checks
/// every request's access token with `validator`.
pub fn app_routes<V: TokenValidator>(config: AuthConfig, validator: V) -> Router {
    let state = AppState {
        client: Arc::new(config.client),
        validator: Arc::new(validator),
        settings: config.settings,
    };

    let protected = Router::new()
        .route("/account", get(account))
        .route("/make-change", get(change_form).post(change_submit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session::<V>,
        ));

    Router::new()
        .route("/", get(home::<V>))
        .route("/login", get(login::<V>))
        .route(
            "/callback",
            get(callback_query::<V>).post(callback_form::<V>),
        )
        .route("/logout", get(logout::<V>))
        .merge(protected)
        .with_state(state)
}

// ── Home ───────────────────────────────────────────────────────────

async fn home<V: TokenValidator>(State(_): State<AppState<V>>, jar: SessionJar) -> Response {
    if jar.get().is_some() {
        return Redirect::to("/account").into_response();
    }
    Html(pages::home()).into_response()
}

// ── Login ──────────────────────────────────────────────────────────

async fn login<V: TokenValidator>(
    State(state): State<AppState<V>>,
    jar: SessionJar,
) -> Result<(SessionJar, Redirect), Error> {
    let auth_req = state.client.authorization_request().await?;
    let jar = jar.begin_exchange(&auth_req.pending, &state.settings);

    tracing::debug!("Redirecting to provider authorization endpoint");

    Ok((jar, Redirect::to(&auth_req.url)))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback_query<V: TokenValidator>(
    State(state): State<AppState<V>>,
    jar: SessionJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    complete_login(&state, jar, params).await
}

/// `response_mode=form_post` variant.
async fn callback_form<V: TokenValidator>(
    State(state): State<AppState<V>>,
    jar: SessionJar,
    Form(params): Form<CallbackParams>,
) -> Response {
    complete_login(&state, jar, params).await
}

/// Validates the callback against the pending login, exchanges the code and
/// starts the session. The pending login named by `state` is consumed
/// whatever the outcome.
async fn complete_login<V: TokenValidator>(
    state: &AppState<V>,
    jar: SessionJar,
    params: CallbackParams,
) -> Response {
    let (jar, pending) = match params.state.as_deref() {
        Some(received) => jar.take_exchange(received, &state.settings),
        None => (jar, None),
    };

    match exchange(state, pending, params).await {
        Ok((session, ttl)) => {
            tracing::info!(sub = ?session.claims.subject(), ttl, "Login successful");
            let jar = jar.set(&session, ttl, &state.settings);
            (jar, Redirect::to(&state.settings.login_redirect)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Login callback rejected");
            (jar, e).into_response()
        }
    }
}

async fn exchange<V: TokenValidator>(
    state: &AppState<V>,
    pending: Option<PendingExchange>,
    params: CallbackParams,
) -> Result<(Session, u64), Error> {
    if let Some(error) = params.error {
        return Err(Error::AuthorizationDenied {
            error,
            description: params.error_description,
        });
    }

    let pending = pending.ok_or(Error::InvalidState)?;
    let received_state = params.state.ok_or(Error::InvalidState)?;
    if !pending.matches_state(&received_state) {
        return Err(Error::InvalidState);
    }
    if pending.is_expired_at(unix_now(), state.settings.pending_ttl_secs) {
        tracing::debug!(issued_at = pending.issued_at, "Pending login expired");
        return Err(Error::InvalidState);
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(Error::MissingAuthorizationCode)?;

    let tokens = state
        .client
        .exchange_code(&code, &pending.code_verifier)
        .await
        .map_err(exchange_failed)?;
    let claims = state
        .client
        .user_claims(&tokens)
        .await
        .map_err(exchange_failed)?;
    let ttl = tokens
        .expires_in
        .unwrap_or(state.settings.default_session_ttl_secs);

    Ok((
        Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            claims,
        },
        ttl,
    ))
}

fn exchange_failed(e: Error) -> Error {
    match e {
        Error::OAuth { detail, .. } => Error::TokenExchangeFailed(detail),
        Error::Http(e) => Error::TokenExchangeFailed(e.to_string()),
        Error::Token(msg) => Error::TokenExchangeFailed(msg),
        other => other,
    }
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<V: TokenValidator>(
    State(state): State<AppState<V>>,
    jar: SessionJar,
) -> (SessionJar, Redirect) {
    if let Some(session) = jar.get() {
        tracing::info!(sub = ?session.claims.subject(), "Logging out");
    }
    let jar = jar.clear_exchanges(&state.settings).clear(&state.settings);
    (jar, Redirect::to(&state.client.logout_url()))
}

// ── Protected pages ────────────────────────────────────────────────

async fn account(Extension(session): Extension<Session>) -> Html<String> {
    Html(pages::account(&session))
}

async fn change_form() -> Html<String> {
    Html(pages::make_change("", None, None))
}

#[derive(Debug, Deserialize)]
struct ChangeForm {
    #[serde(default)]
    amount: String,
}

async fn change_submit(Form(form): Form<ChangeForm>) -> Html<String> {
    match make_change(&form.amount) {
        Ok(result) => Html(pages::make_change(&form.amount, result.as_ref(), None)),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected change amount");
            Html(pages::make_change(
                &form.amount,
                None,
                Some("Please enter a dollar amount"),
            ))
        }
    }
}
