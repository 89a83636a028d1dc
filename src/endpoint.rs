//! Endpoint callbacks and type erasure.
//!
//! A resource definition holds endpoints of many different closure types in
//! one map, so each callback is boxed behind a common function signature the
//! same way route handlers are:
//!
//! ```text
//! async fn index(args: Arguments) -> Result<Reply, ServiceError>   ← user writes this
//!        ↓ Endpoint::new(index)
//! Arc::new(move |args| Box::pin(index(args)))                       ← erased once
//!        ↓ stored in ResourceDefinition
//! endpoint.call(args) at request time                               ← one virtual call
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::arguments::{ArgumentDef, Arguments};
use crate::error::ServiceError;

/// What a successful endpoint produces.
///
/// `result: None` (or a JSON null) renders as a bodiless `200`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reply {
    pub result: Option<Value>,
}

impl Reply {
    pub fn new(result: impl Into<Value>) -> Self {
        Self { result: Some(result.into()) }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Serializes a typed value into the reply.
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, ServiceError> {
        serde_json::to_value(value)
            .map(Self::new)
            .map_err(ServiceError::from_error)
    }
}

/// A heap-allocated, type-erased future that resolves to an endpoint result.
pub type EndpointFuture = Pin<Box<dyn Future<Output = Result<Reply, ServiceError>> + Send + 'static>>;

type Callback = Arc<dyn Fn(Arguments) -> EndpointFuture + Send + Sync + 'static>;

/// A named operation, action or targeted action: its argument schema plus the
/// callback that serves it.
#[derive(Clone)]
pub struct Endpoint {
    arguments: Vec<ArgumentDef>,
    callback: Callback,
}

impl Endpoint {
    /// Wraps any `async fn(Arguments) -> Result<Reply, ServiceError>`.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, ServiceError>> + Send + 'static,
    {
        let callback: Callback = Arc::new(move |args: Arguments| -> EndpointFuture { Box::pin(callback(args)) });
        Self { arguments: Vec::new(), callback }
    }

    /// Appends one argument definition. Order is preserved.
    pub fn argument(mut self, def: ArgumentDef) -> Self {
        self.arguments.push(def);
        self
    }

    pub fn with_arguments(mut self, defs: impl IntoIterator<Item = ArgumentDef>) -> Self {
        self.arguments.extend(defs);
        self
    }

    pub fn arguments(&self) -> &[ArgumentDef] {
        &self.arguments
    }

    pub(crate) fn call(&self, args: Arguments) -> EndpointFuture {
        (self.callback)(args)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}
