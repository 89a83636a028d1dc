//! Structured decomposition of a request path.
//!
//! The URL convention is fixed:
//!
//! ```text
//! /<servicePath>/<resourceId>[/<identifierOrAction>[/<specifierOrTargetedAction>]]
//! ```
//!
//! Splitting on `/` keeps the empty leading segment, so the named slots sit at
//! indices 1 to 4 and argument path offsets count from index 3.

use crate::method::Method;
use crate::request::Request;

/// Index of the first segment after `/<service>/<resource>`.
pub(crate) const ARGUMENT_BASE: usize = 3;

/// Per-request view of the URL. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlInfo {
    pub method: Method,
    pub original_url: String,
    pub path: String,
    pub segments: Vec<String>,
    pub service_domain: Option<String>,
    pub resource_id: Option<String>,
    pub resource_identifier: Option<String>,
    pub resource_specifier: Option<String>,
}

impl UrlInfo {
    pub fn parse(method: Method, original_url: &str) -> Self {
        let path = original_url.split_once('?').map_or(original_url, |(p, _)| p);
        let segments: Vec<String> = path.split('/').map(str::to_owned).collect();
        let slot = |i: usize| segments.get(i).filter(|s| !s.is_empty()).cloned();

        Self {
            method,
            original_url: original_url.to_owned(),
            path: path.to_owned(),
            service_domain: slot(1),
            resource_id: slot(2),
            resource_identifier: slot(3),
            resource_specifier: slot(4),
            segments,
        }
    }

    pub fn from_request(req: &Request) -> Self {
        Self::parse(req.method(), req.original_url())
    }

    /// Segment `offset` places after the resource id; `0` is the identifier
    /// slot. Empty segments read as absent.
    pub fn path_argument(&self, offset: usize) -> Option<&str> {
        ARGUMENT_BASE
            .checked_add(offset)
            .and_then(|i| self.segments.get(i))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for UrlInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.original_url)
    }
}
