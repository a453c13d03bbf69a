//! Session cookie encoding and parsing

use axum::http::{HeaderMap, header};
use session_core::TOKEN_LIFETIME_SECS;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// `Set-Cookie` value for a session cookie
///
/// The cookie is script-inaccessible, HTTPS-only, sent on top-level
/// navigations (`SameSite=Lax`), and scoped to `domain` so the site and its
/// API subdomain share it.
#[must_use]
pub fn build_cookie(value: &str, max_age: u64, domain: &str) -> String {
    [
        format!("{SESSION_COOKIE}={value}"),
        format!("Domain={domain}"),
        "Path=/".to_string(),
        format!("Max-Age={max_age}"),
        "HttpOnly".to_string(),
        "Secure".to_string(),
        "SameSite=Lax".to_string(),
    ]
    .join("; ")
}

/// Cookie that hands `token` to the browser for the token's lifetime
#[must_use]
pub fn issue_cookie(token: &str, domain: &str) -> String {
    build_cookie(token, TOKEN_LIFETIME_SECS, domain)
}

/// Cookie that makes the browser drop the session immediately
#[must_use]
pub fn clear_cookie(domain: &str) -> String {
    build_cookie("", 0, domain)
}

/// Session token from the request's `Cookie` headers, if any
///
/// Values are split on the first `=` only. An empty value counts as absent.
#[must_use]
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for c in cookies {
            map.append(header::COOKIE, HeaderValue::from_str(c).unwrap());
        }
        map
    }

    #[test]
    fn test_issue_cookie_attributes() {
        let cookie = issue_cookie("abc.def.ghi", ".example.com");
        assert_eq!(
            cookie,
            "session=abc.def.ghi; Domain=.example.com; Path=/; Max-Age=604800; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = clear_cookie(".example.com");
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn test_parse_among_other_cookies() {
        let h = headers(&["theme=dark; session=a.b.c; lang=en"]);
        assert_eq!(session_cookie(&h).as_deref(), Some("a.b.c"));
    }

    #[test]
    fn test_parse_across_multiple_headers() {
        let h = headers(&["theme=dark", "session=x.y.z"]);
        assert_eq!(session_cookie(&h).as_deref(), Some("x.y.z"));
    }

    #[test]
    fn test_value_keeps_equals_signs() {
        let h = headers(&["session=a=b=c"]);
        assert_eq!(session_cookie(&h).as_deref(), Some("a=b=c"));
    }

    #[test]
    fn test_missing_or_empty() {
        assert_eq!(session_cookie(&HeaderMap::new()), None);
        assert_eq!(session_cookie(&headers(&["other=1"])), None);
        assert_eq!(session_cookie(&headers(&["session="])), None);
        assert_eq!(session_cookie(&headers(&["sessionx=1"])), None);
    }
}
