//! CORS and CSRF policy shapes.
//!
//! Both deserialize from the camelCase JSON used in service settings:
//!
//! ```json
//! {
//!   "cors": {
//!     "allowedOrigins": ["https://app.example"],
//!     "responseHeaders": [{ "key": "Access-Control-Allow-Credentials", "value": "true" }]
//!   },
//!   "csrf": { "requireToken": true }
//! }
//! ```

use serde::Deserialize;

use crate::method::Method;

/// Default header carrying the CSRF token.
pub const DEFAULT_CSRF_HEADER: &str = "x-csrf-token";

/// Cross-origin policy for a resource or a whole service.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsPolicy {
    /// Echo any `Origin` back. Also answers `*` when no `Origin` is sent.
    pub dangerously_allow_all: bool,
    pub allowed_origins: Vec<String>,
    /// Sent on every request the policy applies to, allowed origin or not.
    pub response_headers: Vec<HeaderEntry>,
}

impl CorsPolicy {
    pub fn allow_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn allow_all() -> Self {
        Self { dangerously_allow_all: true, ..Self::default() }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.push(HeaderEntry { key: key.into(), value: value.into() });
        self
    }

    pub(crate) fn allows(&self, origin: &str) -> bool {
        self.dangerously_allow_all || self.allowed_origins.iter().any(|o| o == origin)
    }
}

/// One extra response header.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

/// Cross-site request forgery policy.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CsrfPolicy {
    pub require_token: bool,
    pub safe_methods: Vec<Method>,
    /// Request header the token travels in. Also the session token name.
    pub token_name: String,
}

impl Default for CsrfPolicy {
    fn default() -> Self {
        Self {
            require_token: false,
            safe_methods: vec![Method::Get, Method::Options],
            token_name: DEFAULT_CSRF_HEADER.to_owned(),
        }
    }
}

impl CsrfPolicy {
    /// A policy that requires a token on every unsafe method.
    pub fn required() -> Self {
        Self { require_token: true, ..Self::default() }
    }

    pub(crate) fn is_safe(&self, method: Method) -> bool {
        self.safe_methods.contains(&method)
    }
}
