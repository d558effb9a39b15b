//! Request routing.
//!
//! | Route | Handler | Responses |
//! |-------|---------|-----------|
//! | `POST /build` | [`build`] | 200 built, 400 rejected or failed |
//! | `GET /preview?token=` | [`preview`] | 302 handoff, 400 no token, 404 no content, 500 failed |
//! | `GET /builds/**` | [`files::serve`] | 200 file, 404 |
//!
//! Routing works on plain [`IncomingRequest`]/[`Reply`] values so it can be
//! driven without a socket.

use super::{ServerState, auth, files};
use crate::{cms::PreviewToken, log, preview::BUILDS_MOUNT};
use tiny_http::Method;

/// The parts of an HTTP request the router looks at.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub url: String,
    pub body: Vec<u8>,
}

#[cfg(test)]
impl IncomingRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::Get,
            url: url.to_owned(),
            body: Vec::new(),
        }
    }

    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            url: url.to_owned(),
            body: body.into(),
        }
    }
}

/// A response ready to be written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Empty-bodied response.
    pub fn status(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn not_found() -> Self {
        Self::new(404, "404 Not Found").with_header("Content-Type", "text/plain")
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302).with_header("Location", location)
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// First header called `name` (case-insensitive).
    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Dispatch one request.
pub async fn route(state: &ServerState, request: IncomingRequest) -> Reply {
    let (path, query) = request
        .url
        .split_once('?')
        .unwrap_or((request.url.as_str(), ""));

    match (&request.method, path) {
        (Method::Post, "/build") => build(state, &request.body).await,
        (Method::Get, "/preview") => preview(state, query).await,
        (Method::Get | Method::Head, _) if is_under_builds(path) => {
            let root = state.config.build.output.clone();
            let relative = path[BUILDS_MOUNT.len()..].to_owned();
            tokio::task::spawn_blocking(move || files::serve(&root, &relative))
                .await
                .unwrap_or_else(|err| {
                    log!("error"; "serving {path}: {err}");
                    Reply::status(500)
                })
        }
        _ => Reply::not_found(),
    }
}

fn is_under_builds(path: &str) -> bool {
    path.strip_prefix(BUILDS_MOUNT)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// `POST /build`: authenticate the webhook and rebuild production.
async fn build(state: &ServerState, body: &[u8]) -> Reply {
    let request: auth::BuildRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => {
            log!("serve"; "rejected build request: invalid body: {err}");
            return Reply::status(400);
        }
    };

    if let Err(err) = auth::authenticate(&request, &state.config) {
        log!("serve"; "rejected build request: {err}");
        return Reply::status(400);
    }

    match state.production.trigger().await {
        Ok(_) => Reply::status(200),
        Err(_) => Reply::status(400),
    }
}

/// `GET /preview?token=..`: build the token's preview and hand off.
async fn preview(state: &ServerState, query: &str) -> Reply {
    let Some(token) = query_param(query, "token").filter(|token| !token.is_empty()) else {
        log!("preview"; "rejected preview request without token");
        return Reply::new(400, "missing token");
    };

    match state.previews.open(&PreviewToken::new(token)).await {
        Ok(session) => Reply::redirect(&session.location).with_header("Set-Cookie", &session.cookie),
        Err(err) if err.is_not_found() => Reply::not_found(),
        Err(_) => Reply::status(500),
    }
}

/// Percent-decoded value of the first `name` parameter in `query`.
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}
