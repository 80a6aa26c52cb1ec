use std::borrow::Cow;
use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use axum_extra::extract::{PrivateCookieJar, SignedCookieJar};
use serde_json::Value;
use time::Duration;

use super::config::AuthSettings;
use crate::types::{PendingExchange, Session, UserClaims};

pub const ACCESS_TOKEN_COOKIE_NAME: &str = "cb_access_token";
pub const REFRESH_TOKEN_COOKIE_NAME: &str = "cb_refresh_token";
pub const USERINFO_COOKIE_NAME: &str = "cb_userinfo";
/// Pending logins are stored one cookie per `state`, named
/// `{PKCE_COOKIE_PREFIX}{state}`, so parallel logins in several tabs do not
/// overwrite each other.
pub const PKCE_COOKIE_PREFIX: &str = "cb_pkce_";

/// Name of the cookie holding the pending login for `state`.
///
/// `None` if `state` could not have been issued by `/login`.
#[must_use]
pub fn pkce_cookie_name(state: &str) -> Option<String> {
    let well_formed = !state.is_empty()
        && state.len() <= 64
        && state
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    well_formed.then(|| format!("{PKCE_COOKIE_PREFIX}{state}"))
}

/// Cookie-backed session store.
///
/// Tokens and the pending login live in encrypted cookies. The user claims
/// live in a signed cookie so the page can still read them from script.
///
/// Use as an Axum extractor and return it from the handler so its changes
/// reach the response.
pub struct SessionJar {
    private: PrivateCookieJar,
    signed: SignedCookieJar,
}

impl SessionJar {
    /// Empty jar (nothing received from the browser).
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            private: PrivateCookieJar::new(key.clone()),
            signed: SignedCookieJar::new(key),
        }
    }

    /// Jar populated from a request's `Cookie` headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, key: Key) -> Self {
        Self {
            private: PrivateCookieJar::from_headers(headers, key.clone()),
            signed: SignedCookieJar::from_headers(headers, key),
        }
    }

    /// The current session, if the browser presented a complete one.
    ///
    /// Claims without an access token (or the reverse) count as no session.
    #[must_use]
    pub fn get(&self) -> Option<Session> {
        let access_token = self
            .private
            .get(ACCESS_TOKEN_COOKIE_NAME)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())?;

        let raw_claims = self.signed.get(USERINFO_COOKIE_NAME)?;
        let json = urlencoding::decode(raw_claims.value()).ok()?;
        let claims: UserClaims = serde_json::from_str(&json).ok()?;

        let refresh_token = self
            .private
            .get(REFRESH_TOKEN_COOKIE_NAME)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty());

        Some(Session {
            access_token,
            refresh_token,
            claims,
        })
    }

    /// Writes all session cookies with the same `max-age`.
    #[must_use]
    pub(crate) fn set(self, session: &Session, ttl_secs: u64, settings: &AuthSettings) -> Self {
        let max_age = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
        let claims_json = Value::Object(session.claims.0.clone()).to_string();

        let mut private = self.private.add(session_cookie(
            ACCESS_TOKEN_COOKIE_NAME,
            session.access_token.clone(),
            true,
            max_age,
            settings,
        ));
        private = match &session.refresh_token {
            Some(refresh_token) => private.add(session_cookie(
                REFRESH_TOKEN_COOKIE_NAME,
                refresh_token.clone(),
                true,
                max_age,
                settings,
            )),
            None => private.remove(removal_cookie(REFRESH_TOKEN_COOKIE_NAME, settings)),
        };

        let signed = self.signed.add(session_cookie(
            USERINFO_COOKIE_NAME,
            urlencoding::encode(&claims_json).into_owned(),
            !settings.expose_claims_to_script,
            max_age,
            settings,
        ));

        Self { private, signed }
    }

    /// Removes every session cookie regardless of remaining lifetime.
    #[must_use]
    pub(crate) fn clear(self, settings: &AuthSettings) -> Self {
        let private = self
            .private
            .remove(removal_cookie(ACCESS_TOKEN_COOKIE_NAME, settings))
            .remove(removal_cookie(REFRESH_TOKEN_COOKIE_NAME, settings));
        let signed = self
            .signed
            .remove(removal_cookie(USERINFO_COOKIE_NAME, settings));
        Self { private, signed }
    }

    /// Stores the pending login until `/callback`.
    #[must_use]
    pub(crate) fn begin_exchange(self, pending: &PendingExchange, settings: &AuthSettings) -> Self {
        let Some(name) = pkce_cookie_name(&pending.state) else {
            tracing::warn!("Refusing to store pending login with malformed state");
            return self;
        };
        let max_age = Duration::seconds(i64::try_from(settings.pending_ttl_secs).unwrap_or(i64::MAX));
        let cookie = session_cookie(name, encode_pending(pending), true, max_age, settings);
        Self {
            private: self.private.add(cookie),
            signed: self.signed,
        }
    }

    /// Removes the pending login for `state` and returns it. One-shot: a
    /// replayed callback finds nothing. Other pending logins are left alone.
    #[must_use]
    pub(crate) fn take_exchange(
        self,
        state: &str,
        settings: &AuthSettings,
    ) -> (Self, Option<PendingExchange>) {
        let Some(name) = pkce_cookie_name(state) else {
            return (self, None);
        };
        let pending = self
            .private
            .get(&name)
            .and_then(|c| decode_pending(c.value()));
        let private = self.private.remove(removal_cookie(name, settings));
        (
            Self {
                private,
                signed: self.signed,
            },
            pending,
        )
    }

    /// Removes every pending login.
    #[must_use]
    pub(crate) fn clear_exchanges(self, settings: &AuthSettings) -> Self {
        let names: Vec<String> = self
            .private
            .iter()
            .map(|c| c.name().to_owned())
            .filter(|name| name.starts_with(PKCE_COOKIE_PREFIX))
            .collect();
        let private = names.into_iter().fold(self.private, |jar, name| {
            jar.remove(removal_cookie(name, settings))
        });
        Self {
            private,
            signed: self.signed,
        }
    }
}

fn session_cookie(
    name: impl Into<Cow<'static, str>>,
    value: String,
    http_only: bool,
    max_age: Duration,
    settings: &AuthSettings,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(http_only)
        .secure(settings.secure_cookies)
        .same_site(SameSite::Lax)
        .path(settings.cookie_path.clone())
        .max_age(max_age)
        .build()
}

fn removal_cookie(name: impl Into<Cow<'static, str>>, settings: &AuthSettings) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path(settings.cookie_path.clone())
        .build()
}

// state and verifier are base64url, so '.' never appears inside them
fn encode_pending(pending: &PendingExchange) -> String {
    format!(
        "{}.{}.{}",
        pending.state, pending.code_verifier, pending.issued_at
    )
}

fn decode_pending(value: &str) -> Option<PendingExchange> {
    let mut parts = value.splitn(3, '.');
    let state = parts.next().filter(|s| !s.is_empty())?;
    let code_verifier = parts.next().filter(|s| !s.is_empty())?;
    let issued_at = parts.next()?.parse().ok()?;
    Some(PendingExchange {
        state: state.to_owned(),
        code_verifier: code_verifier.to_owned(),
        issued_at,
    })
}

impl<S> FromRequestParts<S> for SessionJar
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = Key::from_ref(state);
        Ok(Self::from_headers(&parts.headers, key))
    }
}

impl IntoResponseParts for SessionJar {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        let res = self.private.into_response_parts(res)?;
        self.signed.into_response_parts(res)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use serde_json::json;

    use super::*;

    fn settings() -> AuthSettings {
        AuthSettings {
            cookie_key: Key::generate(),
            cookie_path: "/".into(),
            secure_cookies: false,
            expose_claims_to_script: true,
            pending_ttl_secs: 300,
            default_session_ttl_secs: 3600,
            login_redirect: "/".into(),
        }
    }

    fn session(refresh: Option<&str>) -> Session {
        let Value::Object(claims) = json!({"sub": "user-1", "name": "Ada; Lovelace"}) else {
            unreachable!()
        };
        Session {
            access_token: "access-123".into(),
            refresh_token: refresh.map(str::to_owned),
            claims: UserClaims(claims),
        }
    }

    fn set_cookies(jar: SessionJar) -> Vec<String> {
        let response = (jar, ()).into_response();
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }

    /// Feeds `Set-Cookie` values back as a request `Cookie` header.
    fn replay(set_cookies: &[String], key: Key) -> SessionJar {
        let pairs: Vec<&str> = set_cookies
            .iter()
            .filter_map(|c| c.split(';').next())
            .collect();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&pairs.join("; ")).unwrap());
        SessionJar::from_headers(&headers, key)
    }

    fn find<'a>(cookies: &'a [String], name: &str) -> &'a str {
        cookies
            .iter()
            .find(|c| c.starts_with(&format!("{name}=")))
            .unwrap_or_else(|| panic!("no {name} cookie in {cookies:?}"))
    }

    #[test]
    fn set_writes_three_cookies_with_shared_max_age() {
        let settings = settings();
        let jar = SessionJar::new(settings.cookie_key.clone()).set(
            &session(Some("refresh-456")),
            900,
            &settings,
        );
        let cookies = set_cookies(jar);
        assert_eq!(cookies.len(), 3);

        for name in [
            ACCESS_TOKEN_COOKIE_NAME,
            REFRESH_TOKEN_COOKIE_NAME,
            USERINFO_COOKIE_NAME,
        ] {
            let cookie = find(&cookies, name);
            assert!(cookie.contains("Max-Age=900"), "{cookie}");
            assert!(cookie.contains("SameSite=Lax"), "{cookie}");
            assert!(cookie.contains("Path=/"), "{cookie}");
        }
        assert!(find(&cookies, ACCESS_TOKEN_COOKIE_NAME).contains("HttpOnly"));
        assert!(find(&cookies, REFRESH_TOKEN_COOKIE_NAME).contains("HttpOnly"));
        assert!(!find(&cookies, USERINFO_COOKIE_NAME).contains("HttpOnly"));
        // tokens are encrypted
        assert!(!find(&cookies, ACCESS_TOKEN_COOKIE_NAME).contains("access-123"));
    }

    #[test]
    fn claims_cookie_http_only_when_not_exposed() {
        let mut settings = settings();
        settings.expose_claims_to_script = false;
        let jar = SessionJar::new(settings.cookie_key.clone()).set(&session(None), 60, &settings);
        let cookies = set_cookies(jar);
        assert!(find(&cookies, USERINFO_COOKIE_NAME).contains("HttpOnly"));
    }

    #[test]
    fn get_reads_back_what_set_wrote() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let written = session(Some("refresh-456"));
        let cookies = set_cookies(SessionJar::new(key.clone()).set(&written, 60, &settings));

        let read = replay(&cookies, key).get().unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn get_is_never_partial() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let cookies = set_cookies(SessionJar::new(key.clone()).set(
            &session(Some("r")),
            60,
            &settings,
        ));

        let without_access: Vec<String> = cookies
            .iter()
            .filter(|c| !c.starts_with(ACCESS_TOKEN_COOKIE_NAME))
            .cloned()
            .collect();
        assert!(replay(&without_access, key.clone()).get().is_none());

        let without_claims: Vec<String> = cookies
            .iter()
            .filter(|c| !c.starts_with(USERINFO_COOKIE_NAME))
            .cloned()
            .collect();
        assert!(replay(&without_claims, key).get().is_none());
    }

    #[test]
    fn cookies_from_another_key_are_ignored() {
        let settings = settings();
        let cookies = set_cookies(SessionJar::new(settings.cookie_key.clone()).set(
            &session(None),
            60,
            &settings,
        ));
        assert!(replay(&cookies, Key::generate()).get().is_none());
    }

    #[test]
    fn clear_removes_all_three() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let cookies = set_cookies(SessionJar::new(key.clone()).set(
            &session(Some("r")),
            3600,
            &settings,
        ));

        let cleared = set_cookies(replay(&cookies, key).clear(&settings));
        assert_eq!(cleared.len(), 3);
        for cookie in &cleared {
            assert!(cookie.contains("Max-Age=0"), "{cookie}");
        }
    }

    #[test]
    fn pending_exchange_is_taken_once() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let pending = PendingExchange::new("state-abc".into(), "verifier-xyz".into());
        let cookies = set_cookies(SessionJar::new(key.clone()).begin_exchange(&pending, &settings));
        let cookie = find(&cookies, "cb_pkce_state-abc");
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=300"));

        let (jar, taken) = replay(&cookies, key).take_exchange("state-abc", &settings);
        assert_eq!(taken, Some(pending));
        let removal = set_cookies(jar);
        assert!(find(&removal, "cb_pkce_state-abc").contains("Max-Age=0"));
    }

    #[test]
    fn parallel_logins_keep_separate_records() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let first = PendingExchange::new("tab-one".into(), "verifier-1".into());
        let second = PendingExchange::new("tab-two".into(), "verifier-2".into());
        let mut cookies = set_cookies(SessionJar::new(key.clone()).begin_exchange(&first, &settings));
        cookies.extend(set_cookies(
            SessionJar::new(key.clone()).begin_exchange(&second, &settings),
        ));

        let (jar, taken) = replay(&cookies, key.clone()).take_exchange("tab-one", &settings);
        assert_eq!(taken, Some(first));
        let removed = set_cookies(jar);
        assert_eq!(removed.len(), 1);
        assert!(removed[0].starts_with("cb_pkce_tab-one="));

        let (_, taken) = replay(&cookies, key).take_exchange("tab-two", &settings);
        assert_eq!(taken, Some(second));
    }

    #[test]
    fn unknown_or_malformed_state_takes_nothing() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let pending = PendingExchange::new("state-abc".into(), "verifier-xyz".into());
        let cookies = set_cookies(SessionJar::new(key.clone()).begin_exchange(&pending, &settings));

        for state in ["state-abd", "", "a;b=c", "state abc"] {
            let (jar, taken) = replay(&cookies, key.clone()).take_exchange(state, &settings);
            assert_eq!(taken, None, "{state:?}");
            assert!(set_cookies(jar).is_empty(), "{state:?}");
        }
    }

    #[test]
    fn clear_exchanges_removes_all_pending_logins() {
        let settings = settings();
        let key = settings.cookie_key.clone();
        let mut cookies = Vec::new();
        for state in ["tab-one", "tab-two"] {
            let pending = PendingExchange::new(state.into(), "verifier".into());
            cookies.extend(set_cookies(
                SessionJar::new(key.clone()).begin_exchange(&pending, &settings),
            ));
        }
        cookies.extend(set_cookies(SessionJar::new(key.clone()).set(
            &session(None),
            60,
            &settings,
        )));

        let removed = set_cookies(replay(&cookies, key).clear_exchanges(&settings));
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|c| c.starts_with(PKCE_COOKIE_PREFIX)));
    }

    #[test]
    fn malformed_pending_values_rejected() {
        assert!(decode_pending("only-state").is_none());
        assert!(decode_pending("state.verifier.notanumber").is_none());
        assert!(decode_pending(".verifier.10").is_none());
        assert_eq!(
            decode_pending("s.v.10").map(|p| p.issued_at),
            Some(10)
        );
    }
}
