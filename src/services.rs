//! The service registry: mounts services on a router and renders their
//! outcomes in the wire format.
//!
//! ```text
//! success, result     → 200, result as JSON / JSONP
//! success, no result  → 200, no body
//! CORS preflight      → 204, no body
//! error               → error.code, {"error":{"code":N,"message":"…"}}
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use crate::config::RestServicesConfig;
use crate::error::{Coded, Error, ServiceError};
use crate::request::Request;
use crate::response::{Response, ResponseParts};
use crate::router::Router;
use crate::service::{AbortSignal, Dispatch, ServiceHandler, log};
use crate::status::Status;

/// Representation chosen from the request's `Content-Type`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseFormat {
    Json,
    Jsonp,
    Text,
}

impl ResponseFormat {
    /// Unknown or absent content types answer in JSON.
    pub fn negotiate(req: &Request) -> Self {
        match req.header("content-type").map(media_type) {
            Some("javascript" | "application/javascript") => Self::Jsonp,
            Some("text/plain" | "text/html")              => Self::Text,
            _                                             => Self::Json,
        }
    }
}

/// Strips parameters such as `; charset=utf-8`.
fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}

/// Owns every configured service.
pub struct RestServices {
    services: HashMap<String, Arc<ServiceHandler>>,
    order: Vec<String>,
    debug: bool,
}

impl RestServices {
    /// Builds every service and resource. Service names and mount paths must
    /// be unique.
    pub fn new(config: RestServicesConfig) -> Result<Self, Error> {
        let debug = config.debug;
        let mut services = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut paths: Vec<String> = Vec::new();

        for service in config.services {
            let name = service.name.clone();
            if services.contains_key(&name) {
                return Err(Error::Config(format!("service `{name}` registered twice")));
            }
            if paths.contains(&service.path) {
                return Err(Error::Config(format!("service path `{}` is already mounted", service.path)));
            }
            paths.push(service.path.clone());

            let handler = ServiceHandler::new(service, debug)?;
            services.insert(name.clone(), Arc::new(handler));
            log(debug, format_args!("Service '{name}' registered"));
            order.push(name);
        }

        Ok(Self { services, order, debug })
    }

    /// Services in registration order.
    pub fn services(&self) -> impl Iterator<Item = &Arc<ServiceHandler>> {
        self.order.iter().filter_map(|name| self.services.get(name))
    }

    pub fn service_by_name(&self, name: &str) -> Option<&Arc<ServiceHandler>> {
        self.services.get(name)
    }

    /// Registers `/<servicePath>/<resourceId>` (and everything below it) on
    /// `router` for every resource of every service.
    pub fn mount(self: &Arc<Self>, mut router: Router) -> Result<Router, Error> {
        for service in self.services() {
            log(self.debug, format_args!("Mounting service: {}", service.service_name()));

            for resource_id in service.resource_identifiers() {
                let path = format!("/{}/{resource_id}", service.service_path());
                log(self.debug, format_args!("Registering path {path}"));

                let registry = Arc::clone(self);
                let service = Arc::clone(service);
                router = router.mount(&path, move |req: Request| {
                    let registry = Arc::clone(&registry);
                    let service = Arc::clone(&service);
                    async move {
                        let abort = AbortSignal::new();
                        registry.handle(&service, req, &abort).await
                    }
                })?;
            }
        }
        Ok(router)
    }

    /// Dispatches a request without a router: the service is picked by the
    /// first path segment.
    pub async fn dispatch(&self, req: Request) -> Response {
        self.dispatch_with_abort(req, &AbortSignal::new()).await
    }

    pub async fn dispatch_with_abort(&self, req: Request, abort: &AbortSignal) -> Response {
        let prefix = req.path().trim_start_matches('/').split('/').next().unwrap_or_default();
        match self.services().find(|s| s.service_path() == prefix) {
            Some(service) => self.handle(service, req, abort).await,
            None => {
                let format = ResponseFormat::negotiate(&req);
                let err = ServiceError::not_found("Service not found");
                render_error(format, jsonp_callback(&req).as_deref(), &err, Vec::new())
            }
        }
    }

    async fn handle(&self, service: &ServiceHandler, req: Request, abort: &AbortSignal) -> Response {
        let format = ResponseFormat::negotiate(&req);
        let callback = jsonp_callback(&req);
        let parts = ResponseParts::new();
        let req = Arc::new(req);

        let outcome = service.lookup(Arc::clone(&req), &parts, abort).await;
        if let Err(err) = &outcome {
            log(self.debug, format_args!("{} failed: {}", req.original_url(), Coded(err)));
        }
        send_response(outcome, format, callback.as_deref(), parts)
    }
}

impl std::fmt::Debug for RestServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestServices")
            .field("services", &self.order)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Renders a lookup outcome.
pub fn send_response(
    outcome: Result<Dispatch, ServiceError>,
    format: ResponseFormat,
    callback: Option<&str>,
    parts: ResponseParts,
) -> Response {
    let headers = parts.into_headers();

    let result = match outcome {
        Err(err) => return render_error(format, callback, &err, headers),
        Ok(Dispatch::Preflight) => {
            return Response::builder().status(Status::NoContent).headers(headers).no_body();
        }
        Ok(Dispatch::Completed(reply)) => reply.result.filter(|v| !v.is_null()),
    };

    let Some(result) = result else {
        return Response::builder().headers(headers).no_body();
    };

    let body = match serde_json::to_vec(&result) {
        Ok(body) => body,
        Err(e) => {
            warn!("unable to serialize endpoint result: {e}");
            return render_error(format, callback, &ServiceError::from_error(e), headers);
        }
    };

    let builder = Response::builder().headers(headers);
    match (format, callback) {
        (ResponseFormat::Json, _) | (ResponseFormat::Jsonp, None) => builder.json(body),
        (ResponseFormat::Jsonp, Some(cb)) => builder.jsonp(cb, body),
        (ResponseFormat::Text, _) => builder.status(Status::BadRequest).no_body(),
    }
}

fn render_error(
    format: ResponseFormat,
    callback: Option<&str>,
    err: &ServiceError,
    headers: Vec<(String, String)>,
) -> Response {
    let builder = Response::builder().status(err.code()).headers(headers);
    let body = || serde_json::to_vec(&error_body(err)).unwrap_or_default();
    match (format, callback) {
        (ResponseFormat::Text, _) => builder.text(err.message()),
        (ResponseFormat::Jsonp, Some(cb)) => builder.jsonp(cb, body()),
        _ => builder.json(body()),
    }
}

/// `{"error":{"code":N,"message":"…"}}`
pub fn error_body(err: &ServiceError) -> Value {
    json!({ "error": { "code": err.code(), "message": err.message() } })
}

/// The `callback` query parameter, if it is a safe JavaScript identifier path.
fn jsonp_callback(req: &Request) -> Option<String> {
    let name = req.query("callback")?;
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'));
    valid.then(|| name.to_owned())
}
