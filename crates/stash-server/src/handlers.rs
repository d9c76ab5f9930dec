use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::{check_session, extract_ip, user_agent},
    session::SESSION_TTL,
    store::TextDocument,
    AppState,
};

/// Upload payloads above this are rejected with 400.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("../assets/index.html");

// ── Status helpers ───────────────────────────────────────────────────────────

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

// ── Content negotiation ──────────────────────────────────────────────────────

/// How a text document is rendered back to the client.
#[derive(Debug, PartialEq)]
pub enum Rendered {
    /// Full structured document, for callers that asked for JSON.
    Document(TextDocument),
    /// Just the content string, for direct browser views.
    Plain(String),
}

/// An `Accept` header mentioning `application/json` gets the whole document;
/// anything else gets the bare content as plain text.
pub fn negotiate(accept: Option<&str>, doc: TextDocument) -> Rendered {
    if accept.is_some_and(|a| a.contains("application/json")) {
        Rendered::Document(doc)
    } else {
        Rendered::Plain(doc.content)
    }
}

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        match self {
            Rendered::Document(doc) => Json(doc).into_response(),
            Rendered::Plain(content) => content.into_response(),
        }
    }
}

fn accept_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())
}

// ── Index ────────────────────────────────────────────────────────────────────

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ── Login / session check ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let ip = extract_ip(&headers, &addr);
    let ua = user_agent(&headers);
    match state.sessions.login(&body.password, &ip, &ua) {
        Some(token) => {
            let cookie = format!(
                "sid={token}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax{}",
                SESSION_TTL.as_secs(),
                if state.tls_enabled { "; Secure" } else { "" }
            );
            ([(header::SET_COOKIE, cookie)], StatusCode::OK).into_response()
        }
        None => {
            info!(ip = %ip, "rejected login attempt");
            unauthorized()
        }
    }
}

pub async fn check_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if check_session(&state, &headers, &addr) {
        "OK".into_response()
    } else {
        unauthorized()
    }
}

// ── Files ────────────────────────────────────────────────────────────────────

pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut payload: Option<(String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let name = field.file_name().unwrap_or("").to_owned();
                match field.bytes().await {
                    Ok(bytes) => payload = Some((name, bytes.to_vec())),
                    Err(_) => return bad_request(),
                }
            }
            Ok(None) => break,
            Err(_) => return bad_request(),
        }
    }

    let Some((name, bytes)) = payload else {
        return bad_request();
    };
    if bytes.len() > MAX_UPLOAD_BYTES {
        return bad_request();
    }

    match state.files.put(&name, &bytes) {
        Ok(()) => {
            info!(name = %name, size = bytes.len(), "file uploaded");
            "OK".into_response()
        }
        Err(e) => internal_error(e),
    }
}

pub async fn list_files(State(state): State<AppState>) -> Response {
    match state.files.list() {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn download_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.files.get(&name) {
        Ok(Some(bytes)) => bytes.into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

pub async fn delete_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.files.delete(&name) {
        Ok(()) => "OK".into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Texts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SaveTextRequest {
    pub content: String,
    pub open: bool,
}

pub async fn save_text(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SaveTextRequest>,
) -> Response {
    match state.texts.save(&name, &body.content, body.open) {
        Ok(()) => "OK".into_response(),
        Err(e) => internal_error(e),
    }
}

/// Reads try the public path first, before any session check — an open text
/// is served to anyone. Only then does the session gate apply, so anonymous
/// reads of closed or missing texts answer 401, while an authenticated read
/// of a missing text answers 404.
pub async fn get_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(name): Path<String>,
) -> Response {
    match state.texts.read_public(&name) {
        Ok(Some(doc)) => return negotiate(accept_header(&headers), doc).into_response(),
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    if !check_session(&state, &headers, &addr) {
        return unauthorized();
    }

    match state.texts.read(&name) {
        Ok(Some(doc)) => negotiate(accept_header(&headers), doc).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

pub async fn list_texts(State(state): State<AppState>) -> Response {
    match state.texts.list() {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn delete_text(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.texts.delete(&name) {
        Ok(()) => "OK".into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Public HTML ──────────────────────────────────────────────────────────────

/// Serve an open text under the `<base>.html` naming convention as rendered
/// HTML. The client may address it with or without the `.html` suffix; the
/// document itself lives at `<base>.html.txt`.
pub async fn get_public_html(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let name = crate::sanitize::sanitize(&name);
    let base = name.strip_suffix(".html").unwrap_or(&name);
    let logical = format!("{base}.html");

    match state.texts.read_public(&logical) {
        Ok(Some(doc)) => Html(doc.content).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> TextDocument {
        TextDocument {
            content: content.into(),
            open: true,
        }
    }

    #[test]
    fn json_accept_yields_full_document() {
        let rendered = negotiate(Some("application/json"), doc("hi"));
        assert_eq!(rendered, Rendered::Document(doc("hi")));

        let rendered = negotiate(Some("text/html, application/json;q=0.9"), doc("hi"));
        assert_eq!(rendered, Rendered::Document(doc("hi")));
    }

    #[test]
    fn other_accepts_yield_plain_content() {
        assert_eq!(negotiate(None, doc("hi")), Rendered::Plain("hi".into()));
        assert_eq!(
            negotiate(Some("text/html"), doc("hi")),
            Rendered::Plain("hi".into())
        );
        assert_eq!(
            negotiate(Some("*/*"), doc("hi")),
            Rendered::Plain("hi".into())
        );
    }
}
