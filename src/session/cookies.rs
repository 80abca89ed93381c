//! Cookie codec for server-held sessions.
//!
//! Each field travels in its own HttpOnly, SameSite=Strict cookie so the
//! token is never readable from page script. Clearing sets each cookie to
//! an empty value that expires immediately.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;

use super::Session;

pub const TOKEN_COOKIE: &str = "lb_token";
pub const OWNER_COOKIE: &str = "lb_owner";
pub const REPO_COOKIE: &str = "lb_repo";

/// Thirty days.
const SESSION_MAX_AGE: u64 = 60 * 60 * 24 * 30;

fn cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut out = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        name, value, max_age
    );
    if max_age == 0 {
        out.push_str("; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
    }
    if secure {
        out.push_str("; Secure");
    }
    out
}

/// `Set-Cookie` values establishing `session`.
pub fn session_cookies(session: &Session, secure: bool) -> Vec<String> {
    vec![
        cookie(TOKEN_COOKIE, &session.token, SESSION_MAX_AGE, secure),
        cookie(OWNER_COOKIE, &session.owner, SESSION_MAX_AGE, secure),
        cookie(REPO_COOKIE, &session.repo, SESSION_MAX_AGE, secure),
    ]
}

/// `Set-Cookie` values that expire every session cookie.
pub fn clear_cookies(secure: bool) -> Vec<String> {
    [TOKEN_COOKIE, OWNER_COOKIE, REPO_COOKIE]
        .into_iter()
        .map(|name| cookie(name, "", 0, secure))
        .collect()
}

/// Look up one cookie across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}

/// Rebuild a session from request cookies. `None` unless a non-empty token
/// cookie is present; owner/repo fall back to the given defaults.
pub fn session_from_headers(
    headers: &HeaderMap,
    default_owner: &str,
    default_repo: &str,
) -> Option<Session> {
    let token = cookie_value(headers, TOKEN_COOKIE).filter(|t| !t.is_empty())?;
    let owner = cookie_value(headers, OWNER_COOKIE)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_owner.to_string());
    let repo = cookie_value(headers, REPO_COOKIE)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_repo.to_string());
    match Session::new(token, owner, repo) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!("ignoring malformed session cookies: {}", e);
            None
        }
    }
}
