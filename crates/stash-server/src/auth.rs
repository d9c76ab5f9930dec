use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// Client IP for the session fingerprint: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer address.
pub fn extract_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }
    addr.ip().to_string()
}

/// The other half of the fingerprint. Absent or non-UTF-8 headers count as
/// the empty string, and must keep doing so across requests for the
/// fingerprint match to hold.
pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned()
}

/// Pull the session token out of the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().strip_prefix("sid="))
        .next()
        .map(str::to_owned)
}

/// Validate the request's session cookie against the registry, extending the
/// session on success. False for missing cookie, unknown or expired token,
/// and fingerprint mismatch alike.
pub fn check_session(state: &AppState, headers: &HeaderMap, addr: &SocketAddr) -> bool {
    let Some(token) = session_token(headers) else {
        return false;
    };
    let ip = extract_ip(headers, addr);
    let ua = user_agent(headers);
    state.sessions.authenticate(&token, &ip, &ua)
}

/// Axum middleware gating every protected route. Rejects with a bare 401
/// before any resource access.
pub async fn require_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if check_session(&state, request.headers(), &addr) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn cookie_token_is_extracted_among_other_cookies() {
        let headers = headers_with(header::COOKIE, "theme=dark; sid=abc123; lang=en");
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_sid_cookie_is_none() {
        assert!(session_token(&HeaderMap::new()).is_none());
        let headers = headers_with(header::COOKIE, "theme=dark");
        assert!(session_token(&headers).is_none());
    }

    #[test]
    fn forwarded_header_beats_socket_addr() {
        let addr: SocketAddr = "10.0.0.1:9999".parse().unwrap();
        let headers = headers_with(
            "x-forwarded-for".parse::<header::HeaderName>().unwrap(),
            "203.0.113.7, 10.0.0.1",
        );
        assert_eq!(extract_ip(&headers, &addr), "203.0.113.7");
        assert_eq!(extract_ip(&HeaderMap::new(), &addr), "10.0.0.1");
    }

    #[test]
    fn absent_user_agent_is_empty_string() {
        assert_eq!(user_agent(&HeaderMap::new()), "");
    }
}
