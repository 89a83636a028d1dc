//! Radix-tree request router.
//!
//! One tree per HTTP method. Mounted services register the same handler in
//! every tree, once for the resource root and once as a catch-all below it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A mounted handler shared across concurrent requests.
type MountedHandler = Arc<dyn Fn(Request) -> BoxFuture + Send + Sync + 'static>;

/// The application router.
///
/// Build it once at startup, usually through
/// [`RestServices::mount`](crate::RestServices::mount), and pass it to
/// [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<MountedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers `handler` for every method on `prefix` and on everything
    /// below it (`prefix/{*rest}`).
    pub fn mount<F, Fut>(mut self, prefix: &str, handler: F) -> Result<Self, Error>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let mounted: MountedHandler = Arc::new(move |req: Request| -> BoxFuture { Box::pin(handler(req)) });
        let prefix = prefix.trim_end_matches('/');
        let below = format!("{prefix}/{{*rest}}");
        for method in Method::ALL {
            self = self.add(method, prefix, Arc::clone(&mounted))?;
            self = self.add(method, &below, Arc::clone(&mounted))?;
        }
        Ok(self)
    }

    fn add(mut self, method: Method, path: &str, handler: MountedHandler) -> Result<Self, Error> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .map_err(|e| Error::Config(format!("invalid route `{method} {path}`: {e}")))?;
        Ok(self)
    }

    /// Finds the handler for `path`. A trailing slash falls back to the path
    /// without it, so `/api/users/` reaches the `/api/users` mount.
    fn lookup(&self, method: Method, path: &str) -> Option<MountedHandler> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok().or_else(|| {
            let trimmed = path.trim_end_matches('/');
            (trimmed.len() < path.len() && !trimmed.is_empty())
                .then(|| tree.at(trimmed).ok())
                .flatten()
        })?;
        Some(Arc::clone(matched.value))
    }

    /// Runs `req` through the matching mount. Unrouted requests get a
    /// bodiless `404`.
    pub async fn route(&self, req: Request) -> Response {
        match self.lookup(req.method(), req.path()) {
            Some(handler) => handler(req).await,
            None => Response::status(Status::NotFound),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
