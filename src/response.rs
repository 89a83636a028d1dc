//! Outgoing HTTP response type and the [`ResponseParts`] handle dispatch steps
//! write headers into.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::Full;

use crate::status::{Status, to_status_code};

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use restmount::{Response, Status};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(Status::NoContent);
///
/// Response::builder()
///     .status(Status::Created)
///     .header("location", "/api/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: u16,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: impl Into<u16>) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code.into() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.into() }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the hyper representation. Headers that are not valid
    /// HTTP are dropped with a warning rather than failing the response.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(to_status_code(self.status));
        for (name, value) in &self.headers {
            match (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                let mut fallback = http::Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200`. Terminated by a
/// typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: impl Into<u16>) -> Self {
        self.status = code.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Appends a batch of headers, e.g. the ones collected during dispatch.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a JSONP body. `callback` must already be validated.
    pub fn jsonp(self, callback: &str, body: Vec<u8>) -> Response {
        let json = String::from_utf8_lossy(&body);
        let wrapped = format!("/**/ typeof {callback} === 'function' && {callback}({json});");
        self.finish("text/javascript; charset=utf-8", wrapped.into_bytes())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with no body (e.g. `Status::NoContent`).
    pub fn no_body(self) -> Response {
        Response { body: Vec::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── ResponseParts ─────────────────────────────────────────────────────────────

/// Response state accumulated while a request is dispatched.
///
/// Access control writes CORS headers here, the service handler records the
/// cache-control policy here, and endpoint callbacks can reach it through
/// [`Arguments::response`](crate::Arguments::response). The registry folds
/// everything into the final [`Response`].
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct ResponseParts {
    inner: Arc<Mutex<PartsInner>>,
}

#[derive(Debug, Default)]
struct PartsInner {
    headers: Vec<(String, String)>,
    cache_control: Option<String>,
}

impl ResponseParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any earlier value under the same name.
    pub fn set_header(&self, name: &str, value: &str) {
        let mut inner = self.lock();
        inner.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        inner.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.lock().headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.lock().headers.clone()
    }

    pub fn set_cache_control(&self, policy: String) {
        self.lock().cache_control = Some(policy);
    }

    pub fn cache_control(&self) -> Option<String> {
        self.lock().cache_control.clone()
    }

    /// Headers to emit, with the cache policy rendered as `cache-control`.
    pub(crate) fn into_headers(self) -> Vec<(String, String)> {
        let inner = self.lock();
        let mut headers = inner.headers.clone();
        if let Some(policy) = &inner.cache_control {
            headers.push(("cache-control".to_owned(), policy.clone()));
        }
        headers
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PartsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
