//! The per-service dispatch pipeline.
//!
//! A [`ServiceHandler`] owns the resources of one service and turns a request
//! into an endpoint result:
//!
//! ```text
//! url info → resource → selector → enabled? → access control → endpoint
//!          → arguments → lookup_alter → endpoint_access → cache policy → callback
//! ```
//!
//! Every step returns early through `?`; nothing runs after the first error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::arguments::{Arguments, bind_arguments};
use crate::config::{ServiceConfig, ServiceSettings};
use crate::endpoint::{Endpoint, Reply};
use crate::error::{Error, ServiceError};
use crate::request::Request;
use crate::resource::{Access, Resource};
use crate::response::ResponseParts;
use crate::selector::{Selector, build_selector};
use crate::url_info::UrlInfo;

/// Customization points around endpoint invocation.
///
/// Both run after arguments are bound and before the callback. Override them
/// to load per-request data or to plug in authorization.
#[async_trait]
pub trait ServiceHooks: Send + Sync {
    /// Runs first. An error aborts the request.
    async fn lookup_alter(
        &self,
        _endpoint: &Endpoint,
        _selector: &Selector,
        _args: &mut Arguments,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    /// `Ok(false)` rejects the request with `401`.
    async fn endpoint_access(
        &self,
        _endpoint: &Endpoint,
        _selector: &Selector,
        _args: &Arguments,
    ) -> Result<bool, ServiceError> {
        Ok(true)
    }
}

/// The hooks every service gets unless it configures its own.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl ServiceHooks for DefaultHooks {}

/// Set by the transport when the caller goes away.
///
/// Checked before argument binding and before the endpoint callback; an
/// aborted request never reaches the callback.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.is_aborted() { Err(ServiceError::aborted()) } else { Ok(()) }
    }
}

/// How a successful lookup ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    /// CORS answered a preflight; respond `204` with no body.
    Preflight,
    /// The endpoint callback ran.
    Completed(Reply),
}

/// One named service: its mount path and resources.
pub struct ServiceHandler {
    name: String,
    label: Option<String>,
    path: String,
    settings: Arc<ServiceSettings>,
    resources: HashMap<String, Arc<dyn Resource>>,
    order: Vec<String>,
    hooks: Arc<dyn ServiceHooks>,
    debug: bool,
}

impl ServiceHandler {
    /// Instantiates every resource of `config` eagerly.
    pub fn new(config: ServiceConfig, debug: bool) -> Result<Self, Error> {
        let settings = Arc::new(config.settings);
        let mut resources: HashMap<String, Arc<dyn Resource>> = HashMap::new();
        let mut order = Vec::new();

        for factory in config.resources {
            let resource = factory(Arc::clone(&settings))?;
            let id = resource.resource_id().to_owned();
            if id.is_empty() {
                return Err(Error::Config("Resource id is not defined".to_owned()));
            }
            if resources.insert(id.clone(), resource).is_some() {
                return Err(Error::Config(format!(
                    "service `{}` registers resource `{id}` twice",
                    config.name,
                )));
            }
            log(debug, format_args!("Resource {id} registered"));
            order.push(id);
        }

        Ok(Self {
            name: config.name,
            label: config.label,
            path: config.path,
            settings,
            resources,
            order,
            hooks: config.hooks.unwrap_or_else(|| Arc::new(DefaultHooks)),
            debug,
        })
    }

    pub fn service_name(&self) -> &str { &self.name }
    pub fn service_label(&self) -> Option<&str> { self.label.as_deref() }
    pub fn service_path(&self) -> &str { &self.path }
    pub fn settings(&self) -> &ServiceSettings { &self.settings }

    pub fn resource(&self, id: &str) -> Option<&Arc<dyn Resource>> {
        self.resources.get(id)
    }

    /// Resource ids in registration order.
    pub fn resource_identifiers(&self) -> &[String] {
        &self.order
    }

    pub fn url_info(&self, req: &Request) -> UrlInfo {
        UrlInfo::from_request(req)
    }

    pub fn build_selector(&self, info: &UrlInfo) -> Option<Selector> {
        build_selector(info)
    }

    /// Routes one request to its endpoint and runs it.
    pub async fn lookup(
        &self,
        req: Arc<Request>,
        res: &ResponseParts,
        abort: &AbortSignal,
    ) -> Result<Dispatch, ServiceError> {
        let info = self.url_info(&req);

        let resource = info
            .resource_id
            .as_deref()
            .and_then(|id| self.resource(id))
            .ok_or_else(|| ServiceError::not_found("Resource not found"))?;

        let selector = self
            .build_selector(&info)
            .ok_or_else(|| ServiceError::unavailable(format!("No selector for url: {info}")))?;

        if !resource.resource_enabled(&selector) {
            return Err(ServiceError::unavailable("Resource is not available"));
        }

        if resource.access_control(&req, res, &info)? == Access::Preflight {
            debug!(url = %info, "answered CORS preflight");
            return Ok(Dispatch::Preflight);
        }

        let endpoint = resource
            .endpoint_info(&selector)
            .ok_or_else(|| ServiceError::not_found("Resource endpoint not found"))?;

        abort.check()?;
        let values = bind_arguments(&req, &info, endpoint.arguments()).map_err(|e| {
            debug!(url = %info, error = %e, "argument binding failed");
            ServiceError::bad_request("Unable to process resource arguments")
        })?;
        let mut args = Arguments::new(values, Arc::clone(&req), res.clone());

        log(self.debug, format_args!("Executing '{}' / '{}'", selector.kind, selector.operation));

        self.hooks.lookup_alter(endpoint, &selector, &mut args).await?;

        if !self.hooks.endpoint_access(endpoint, &selector, &args).await? {
            return Err(ServiceError::unauthorized("Access to this endpoint is denied"));
        }

        if let Some(policy) = resource.cache_control_enabled(&selector) {
            res.set_cache_control(policy);
        }

        abort.check()?;
        let reply = endpoint.call(args).await?;
        Ok(Dispatch::Completed(reply))
    }
}

impl std::fmt::Debug for ServiceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandler")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("resources", &self.order)
            .finish_non_exhaustive()
    }
}

/// Registry chatter: `info` when the registry runs in debug mode, `debug`
/// otherwise.
pub(crate) fn log(verbose: bool, message: std::fmt::Arguments<'_>) {
    if verbose {
        info!("{message}");
    } else {
        debug!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;
    use crate::arguments::{ArgumentDef, ArgumentSource};
    use crate::method::Method;
    use crate::policy::CorsPolicy;
    use crate::resource::ResourceEntity;

    fn counting(calls: Arc<AtomicUsize>) -> Endpoint {
        Endpoint::new(move |args: Arguments| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ServiceError>(Reply::new(json!({ "args": args.values().clone() })))
            }
        })
    }

    fn handler(calls: Arc<AtomicUsize>) -> ServiceHandler {
        let config = ServiceConfig::new("test", "api").entity(
            ResourceEntity::builder()
                .id("resource")
                .operation("index", counting(Arc::clone(&calls)))
                .operation(
                    "retrieve",
                    counting(Arc::clone(&calls))
                        .argument(ArgumentDef::new("id", ArgumentSource::Path(0)).int()),
                )
                .action(
                    "search",
                    counting(calls).argument(ArgumentDef::new("q", ArgumentSource::Field("q".into()))),
                )
                .cache_control(Selector::operation("index"), "max-age=60"),
        );
        ServiceHandler::new(config, false).unwrap()
    }

    async fn run(
        handler: &ServiceHandler,
        req: Request,
    ) -> (Result<Dispatch, ServiceError>, ResponseParts) {
        let parts = ResponseParts::new();
        let outcome = handler.lookup(Arc::new(req), &parts, &AbortSignal::new()).await;
        (outcome, parts)
    }

    #[tokio::test]
    async fn index_runs_once_and_records_cache_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = handler(Arc::clone(&calls));
        let (outcome, parts) = run(&handler, Request::builder(Method::Get, "/api/resource").build()).await;

        assert!(matches!(outcome, Ok(Dispatch::Completed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(parts.cache_control().as_deref(), Some("max-age=60"));
    }

    #[tokio::test]
    async fn retrieve_binds_typed_path_argument() {
        let handler = handler(Arc::new(AtomicUsize::new(0)));
        let (outcome, _) = run(&handler, Request::builder(Method::Get, "/api/resource/42").build()).await;
        let Ok(Dispatch::Completed(reply)) = outcome else { panic!("expected a reply") };
        assert_eq!(reply.result, Some(json!({ "args": { "id": 42 } })));
    }

    #[tokio::test]
    async fn failures_map_to_codes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = handler(Arc::clone(&calls));
        let cases = [
            (Method::Get, "/api/missing", 404),
            (Method::Put, "/api/resource", 500),
            (Method::Delete, "/api/resource/1", 404),
            (Method::Post, "/api/resource/search", 400),
        ];
        for (method, url, code) in cases {
            let (outcome, _) = run(&handler, Request::builder(method, url).build()).await;
            assert_eq!(outcome.unwrap_err().code(), code, "{method} {url}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn aborted_requests_never_reach_the_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = handler(Arc::clone(&calls));
        let abort = AbortSignal::new();
        abort.abort();
        let req = Arc::new(Request::builder(Method::Get, "/api/resource").build());
        let err = handler.lookup(req, &ResponseParts::new(), &abort).await.unwrap_err();
        assert_eq!(err.code(), 499);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct DenyAll;

    #[async_trait]
    impl ServiceHooks for DenyAll {
        async fn endpoint_access(
            &self,
            _endpoint: &Endpoint,
            _selector: &Selector,
            _args: &Arguments,
        ) -> Result<bool, ServiceError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn denied_access_is_401() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ServiceConfig::new("test", "api")
            .hooks(Arc::new(DenyAll))
            .entity(ResourceEntity::builder().id("resource").operation("index", counting(Arc::clone(&calls))));
        let handler = ServiceHandler::new(config, false).unwrap();

        let (outcome, _) = run(&handler, Request::builder(Method::Get, "/api/resource").build()).await;
        assert_eq!(outcome.unwrap_err().code(), 401);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preflight_stops_before_the_endpoint() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ServiceConfig::new("test", "api").entity(
            ResourceEntity::builder()
                .id("resource")
                .cors(CorsPolicy::allow_all())
                .operation("options", counting(Arc::clone(&calls))),
        );
        let handler = ServiceHandler::new(config, false).unwrap();

        let req = Request::builder(Method::Options, "/api/resource/1")
            .header("Origin", "https://x")
            .build();
        let (outcome, parts) = run(&handler, req).await;
        assert_eq!(outcome.unwrap(), Dispatch::Preflight);
        assert_eq!(parts.header("access-control-allow-origin").as_deref(), Some("https://x"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_resource_is_unavailable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ServiceConfig::new("test", "api").entity(
            ResourceEntity::builder()
                .id("resource")
                .operation("index", counting(Arc::clone(&calls)))
                .enabled(|selector| selector.operation != "index"),
        );
        let handler = ServiceHandler::new(config, false).unwrap();

        let (outcome, _) = run(&handler, Request::builder(Method::Get, "/api/resource").build()).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.code(), 500);
        assert_eq!(err.message(), "Resource is not available");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct RejectLookup;

    #[async_trait]
    impl ServiceHooks for RejectLookup {
        async fn lookup_alter(
            &self,
            _endpoint: &Endpoint,
            _selector: &Selector,
            _args: &mut Arguments,
        ) -> Result<(), ServiceError> {
            Err(ServiceError::new(403u16, "maintenance window"))
        }
    }

    #[tokio::test]
    async fn failing_lookup_alter_stops_before_the_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ServiceConfig::new("test", "api")
            .hooks(Arc::new(RejectLookup))
            .entity(ResourceEntity::builder().id("resource").operation("index", counting(Arc::clone(&calls))));
        let handler = ServiceHandler::new(config, false).unwrap();

        let (outcome, _) = run(&handler, Request::builder(Method::Get, "/api/resource").build()).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.code(), 403);
        assert_eq!(err.message(), "maintenance window");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct TagArguments;

    #[async_trait]
    impl ServiceHooks for TagArguments {
        async fn lookup_alter(
            &self,
            _endpoint: &Endpoint,
            selector: &Selector,
            args: &mut Arguments,
        ) -> Result<(), ServiceError> {
            args.insert("operation", selector.operation.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn lookup_alter_can_extend_arguments() {
        let config = ServiceConfig::new("test", "api")
            .hooks(Arc::new(TagArguments))
            .entity(ResourceEntity::builder().id("resource").operation("index", counting(Arc::new(AtomicUsize::new(0)))));
        let handler = ServiceHandler::new(config, false).unwrap();

        let (outcome, _) = run(&handler, Request::builder(Method::Get, "/api/resource").build()).await;
        let Ok(Dispatch::Completed(reply)) = outcome else { panic!("expected a reply") };
        assert_eq!(reply.result, Some(json!({ "args": { "operation": "index" } })));
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let config = ServiceConfig::new("test", "api")
            .entity(ResourceEntity::builder().id("users"))
            .entity(ResourceEntity::builder().id("users"));
        assert!(ServiceHandler::new(config, false).is_err());
    }

    #[test]
    fn resources_keep_registration_order() {
        let config = ServiceConfig::new("test", "api")
            .label("Test API")
            .entity(ResourceEntity::builder().id("b"))
            .entity(ResourceEntity::builder().id("a"));
        let handler = ServiceHandler::new(config, false).unwrap();
        assert_eq!(handler.resource_identifiers(), ["b", "a"]);
        assert_eq!(handler.service_label(), Some("Test API"));
        assert_eq!(handler.resource("a").unwrap().resource_id(), "a");
    }
}
