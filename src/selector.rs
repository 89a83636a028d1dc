//! Maps HTTP verb + path shape onto an endpoint selector.

use std::fmt;

use crate::method::Method;
use crate::url_info::UrlInfo;

/// Which table of a resource definition an endpoint lives in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EndpointType {
    Operations,
    Actions,
    TargetedActions,
}

impl EndpointType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operations      => "operations",
            Self::Actions         => "actions",
            Self::TargetedActions => "targetedActions",
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved intent of a request.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Selector {
    pub kind: EndpointType,
    pub operation: String,
}

impl Selector {
    pub fn new(kind: EndpointType, operation: impl Into<String>) -> Self {
        Self { kind, operation: operation.into() }
    }

    pub fn operation(name: &str) -> Self {
        Self::new(EndpointType::Operations, name)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.operation)
    }
}

/// Derives the selector for `info`, or `None` when the verb and path shape
/// name no endpoint.
pub fn build_selector(info: &UrlInfo) -> Option<Selector> {
    let identifier = info.resource_identifier.as_deref();
    let specifier = info.resource_specifier.as_deref();

    match (info.method, identifier, specifier) {
        (Method::Get, None, _)               => Some(Selector::operation("index")),
        (Method::Get, Some(_), _)            => Some(Selector::operation("retrieve")),
        (Method::Post, None, _)              => Some(Selector::operation("create")),
        (Method::Post, Some(action), None)   => Some(Selector::new(EndpointType::Actions, action)),
        (Method::Post, Some(_), Some(action)) => {
            Some(Selector::new(EndpointType::TargetedActions, action))
        }
        (Method::Put, Some(_), _)            => Some(Selector::operation("update")),
        (Method::Delete, Some(_), _)         => Some(Selector::operation("delete")),
        (Method::Options, Some(_), _)        => Some(Selector::operation("options")),
        _                                    => None,
    }
}
