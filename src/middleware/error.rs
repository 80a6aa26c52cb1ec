use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};

use super::pages;
use crate::error::Error;

impl Error {
    /// HTTP status this error is reported with when rendered as a page.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidState
            | Self::MissingAuthorizationCode
            | Self::AuthorizationDenied { .. } => StatusCode::BAD_REQUEST,
            Self::TokenExchangeFailed(_)
            | Self::Discovery(_)
            | Self::OAuth { .. }
            | Self::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            // The browser must go through provider logout to start over.
            Self::SessionExpired | Self::TokenExpired | Self::Token(_) => {
                Redirect::to("/logout").into_response()
            }
            Self::InvalidState => page(
                &self,
                "Login failed",
                "The login attempt is unknown or has expired. Please log in again.",
            ),
            Self::MissingAuthorizationCode => page(
                &self,
                "Login failed",
                "The provider did not return an authorization code.",
            ),
            Self::AuthorizationDenied {
                ref error,
                ref description,
            } => {
                let detail = description.as_deref().unwrap_or(error);
                page(&self, "Login denied", detail)
            }
            Self::TokenExchangeFailed(_)
            | Self::Discovery(_)
            | Self::OAuth { .. }
            | Self::Http(_) => {
                tracing::error!(error = %self, "Identity provider call failed");
                page(
                    &self,
                    "Login failed",
                    "The identity provider could not complete the request. Please try again.",
                )
            }
            _ => {
                tracing::error!(error = %self, "Internal error");
                page(&self, "Something went wrong", "Internal error")
            }
        }
    }
}

fn page(error: &Error, title: &str, detail: &str) -> Response {
    (error.status_code(), Html(pages::error(title, detail))).into_response()
}
