use serde_json::Value;

use crate::change::Change;
use crate::types::Session;

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:40rem;margin:2rem auto;padding:0 1rem}\
nav a{margin-right:1rem}pre{background:#f4f4f4;padding:1rem;overflow-x:auto}\
.error{color:#b00020}table{border-collapse:collapse}td{padding:.25rem 1rem .25rem 0}";

fn layout(title: &str, signed_in: bool, body: &str) -> String {
    let nav = if signed_in {
        r#"<a href="/account">Account</a><a href="/make-change">Make change</a><a href="/logout">Log out</a>"#
    } else {
        r#"<a href="/login">Log in</a>"#
    };
    format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title} | Change Bank</title><style>{STYLE}</style></head>\
         <body><nav>{nav}</nav><main>{body}</main></body></html>",
        title = escape(title),
    )
}

pub(super) fn home() -> String {
    layout(
        "Welcome",
        false,
        "<h1>Change Bank</h1>\
         <p>Break a dollar amount into nickels and pennies.</p>\
         <p><a href=\"/login\">Log in to get started</a></p>",
    )
}

pub(super) fn account(session: &Session) -> String {
    let claims = &session.claims;
    let name = claims.display_name().unwrap_or("there");
    let email = claims
        .email()
        .map(|e| format!("<p>Signed in as <strong>{}</strong></p>", escape(e)))
        .unwrap_or_default();
    let pretty = serde_json::to_string_pretty(&Value::Object(claims.0.clone()))
        .unwrap_or_else(|_| "{}".into());

    let body = format!(
        "<h1>Hello, {name}</h1>{email}\
         <h2>Your claims</h2><pre>{pretty}</pre>\
         <p><a href=\"/make-change\">Make change</a> · <a href=\"/logout\">Log out</a></p>",
        name = escape(name),
        pretty = escape(&pretty),
    );
    layout("Account", true, &body)
}

/// Form plus, when present, the previous result or a field-level error.
pub(super) fn make_change(amount: &str, result: Option<&Change>, field_error: Option<&str>) -> String {
    let error = field_error
        .map(|e| format!("<p class=\"error\">{}</p>", escape(e)))
        .unwrap_or_default();
    let result = result
        .map(|c| {
            format!(
                "<h2>${total}</h2><table>\
                 <tr><td>Nickels</td><td>{nickels}</td></tr>\
                 <tr><td>Pennies</td><td>{pennies}</td></tr></table>",
                total = escape(&c.total),
                nickels = escape(&c.nickels),
                pennies = escape(&c.pennies),
            )
        })
        .unwrap_or_default();

    let body = format!(
        "<h1>Make change</h1>\
         <form method=\"post\" action=\"/make-change\">\
         <label for=\"amount\">Dollar amount</label> \
         <input id=\"amount\" name=\"amount\" value=\"{amount}\" autofocus> \
         <button type=\"submit\">Calculate</button></form>{error}{result}",
        amount = escape(amount),
    );
    layout("Make change", true, &body)
}

pub(super) fn error(title: &str, detail: &str) -> String {
    let body = format!(
        "<h1>{}</h1><p>{}</p><p><a href=\"/\">Back to start</a></p>",
        escape(title),
        escape(detail),
    );
    layout(title, false, &body)
}

pub(super) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
