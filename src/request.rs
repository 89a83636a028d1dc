//! Incoming HTTP request type.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::method::Method;
use crate::session::Session;

/// An incoming HTTP request.
///
/// The server builds one per hyper request: the body is already parsed into a
/// [`Value`] and the query string is already decoded. Hosts that drive the
/// registry themselves (tests, serverless adapters) use [`Request::builder`].
pub struct Request {
    pub(crate) method: Method,
    pub(crate) original_url: String,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
    pub(crate) session: Option<Arc<dyn Session>>,
}

impl Request {
    /// Starts a request for `method` on `url`. `url` may carry a query string.
    pub fn builder(method: Method, url: &str) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                method,
                original_url: url.to_owned(),
                path: split_path(url).to_owned(),
                query: parse_query(url),
                headers: Vec::new(),
                body: None,
                session: None,
            },
        }
    }

    pub fn method(&self) -> Method { self.method }
    /// Path plus query string, exactly as received.
    pub fn original_url(&self) -> &str { &self.original_url }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> Option<&Value> { self.body.as_ref() }
    pub fn session(&self) -> Option<&dyn Session> { self.session.as_deref() }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of a decoded query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn set_session(&mut self, session: Option<Arc<dyn Session>>) {
        self.session = session;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("original_url", &self.original_url)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Sets an already-parsed body.
    pub fn body(mut self, body: Value) -> Self {
        self.request.body = Some(body);
        self
    }

    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.request.session = Some(session);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

fn split_path(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

fn parse_query(url: &str) -> Vec<(String, String)> {
    match url.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => Vec::new(),
    }
}
