//! Resources: one addressable entity type each.
//!
//! [`Resource`] is the capability interface the service handler talks to.
//! [`ResourceEntity`] is the stock implementation: a definition table of
//! endpoints plus optional CORS/CSRF policies that fall back to the owning
//! service's settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::config::ServiceSettings;
use crate::endpoint::Endpoint;
use crate::error::{Error, ServiceError};
use crate::method::Method;
use crate::policy::{CorsPolicy, CsrfPolicy, DEFAULT_CSRF_HEADER};
use crate::request::Request;
use crate::response::ResponseParts;
use crate::selector::{EndpointType, Selector};
use crate::session::{Session, token_key};
use crate::url_info::UrlInfo;

/// Outcome of a successful access-control check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    /// Continue to the endpoint.
    Granted,
    /// CORS answered an `OPTIONS` request; reply `204` and stop.
    Preflight,
}

/// What the service handler needs from a resource.
///
/// Only [`resource_id`](Resource::resource_id) and
/// [`endpoint_info`](Resource::endpoint_info) are required. The rest are
/// hooks with permissive defaults.
pub trait Resource: Send + Sync {
    fn resource_id(&self) -> &str;

    /// The endpoint serving `selector`, if the definition has one.
    fn endpoint_info(&self, selector: &Selector) -> Option<&Endpoint>;

    /// Capability check run before access control.
    fn resource_enabled(&self, _selector: &Selector) -> bool {
        true
    }

    /// Cache policy (a `Cache-Control` value) for `selector`.
    fn cache_control_enabled(&self, _selector: &Selector) -> Option<String> {
        None
    }

    fn resource_cors(&self) -> Option<&CorsPolicy> {
        None
    }

    fn resource_csrf(&self) -> Option<&CsrfPolicy> {
        None
    }

    /// CORS, then CSRF. The first failure wins; a CORS-answered `OPTIONS`
    /// request never reaches the CSRF check.
    fn access_control(
        &self,
        req: &Request,
        res: &ResponseParts,
        info: &UrlInfo,
    ) -> Result<Access, ServiceError> {
        if self.access_control_cors(req, res, info) == Access::Preflight {
            return Ok(Access::Preflight);
        }
        self.access_control_csrf(req, info)?;
        Ok(Access::Granted)
    }

    fn access_control_cors(&self, req: &Request, res: &ResponseParts, info: &UrlInfo) -> Access {
        let Some(cors) = self.resource_cors() else {
            return Access::Granted;
        };

        match req.header("origin") {
            Some(origin) if cors.allows(origin) => {
                res.set_header("Access-Control-Allow-Origin", origin);
                res.set_header("Vary", "Origin");
            }
            Some(origin) => debug!(%origin, resource = self.resource_id(), "origin not allowed"),
            None if cors.dangerously_allow_all => res.set_header("Access-Control-Allow-Origin", "*"),
            None => {}
        }

        for header in &cors.response_headers {
            res.set_header(&header.key, &header.value);
        }

        if info.method == Method::Options { Access::Preflight } else { Access::Granted }
    }

    fn access_control_csrf(&self, req: &Request, info: &UrlInfo) -> Result<(), ServiceError> {
        let Some(csrf) = self.resource_csrf() else {
            return Ok(());
        };
        if !csrf.require_token || csrf.is_safe(info.method) {
            return Ok(());
        }

        let valid = match (req.session(), req.header(&csrf.token_name)) {
            (Some(session), Some(token)) => {
                self.is_valid_session_token(session, &csrf.token_name, token)
            }
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            debug!(resource = self.resource_id(), url = %info, "rejected CSRF token");
            Err(ServiceError::unauthorized("Invalid CSRF token"))
        }
    }

    // ── Session tokens ───────────────────────────────────────────────────────

    fn session_token(&self, session: &dyn Session, name: &str) -> Option<String> {
        session.get(&token_key(name))
    }

    fn set_session_token(&self, session: &dyn Session, name: &str, token: &str) {
        session.set(&token_key(name), token.to_owned());
    }

    fn is_valid_session_token(&self, session: &dyn Session, name: &str, token: &str) -> bool {
        self.session_token(session, name).is_some_and(|stored| stored == token)
    }

    /// The CSRF token for this session, minted as a UUID v4 on first access.
    fn current_token(&self, session: &dyn Session) -> String {
        let name = self.resource_csrf().map_or(DEFAULT_CSRF_HEADER, |c| c.token_name.as_str());
        if let Some(token) = self.session_token(session, name) {
            return token;
        }
        let token = Uuid::new_v4().to_string();
        self.set_session_token(session, name, &token);
        token
    }
}

// ── ResourceDefinition ────────────────────────────────────────────────────────

/// Endpoint tables of one resource, keyed by selector type and name.
#[derive(Clone, Debug, Default)]
pub struct ResourceDefinition {
    operations: HashMap<String, Endpoint>,
    actions: HashMap<String, Endpoint>,
    targeted_actions: HashMap<String, Endpoint>,
}

impl ResourceDefinition {
    pub fn get(&self, selector: &Selector) -> Option<&Endpoint> {
        self.table(selector.kind).get(&selector.operation)
    }

    /// Returns `false` if the name was already taken within `kind`.
    fn insert(&mut self, kind: EndpointType, name: String, endpoint: Endpoint) -> bool {
        let table = match kind {
            EndpointType::Operations      => &mut self.operations,
            EndpointType::Actions         => &mut self.actions,
            EndpointType::TargetedActions => &mut self.targeted_actions,
        };
        table.insert(name, endpoint).is_none()
    }

    fn table(&self, kind: EndpointType) -> &HashMap<String, Endpoint> {
        match kind {
            EndpointType::Operations      => &self.operations,
            EndpointType::Actions         => &self.actions,
            EndpointType::TargetedActions => &self.targeted_actions,
        }
    }
}

// ── ResourceEntity ────────────────────────────────────────────────────────────

type EnabledFn = Box<dyn Fn(&Selector) -> bool + Send + Sync>;

/// The stock [`Resource`].
///
/// ```rust
/// use restmount::{Endpoint, Reply, ResourceEntity, ServiceError, Arguments};
///
/// async fn index(_args: Arguments) -> Result<Reply, ServiceError> {
///     Ok(Reply::new(serde_json::json!([])))
/// }
///
/// let users = ResourceEntity::builder()
///     .id("users")
///     .operation("index", Endpoint::new(index))
///     .build()
///     .unwrap();
/// ```
pub struct ResourceEntity {
    id: String,
    definition: ResourceDefinition,
    cors: Option<CorsPolicy>,
    csrf: Option<CsrfPolicy>,
    settings: Arc<ServiceSettings>,
    cache_control: HashMap<Selector, String>,
    enabled: Option<EnabledFn>,
}

impl ResourceEntity {
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }
}

impl Resource for ResourceEntity {
    fn resource_id(&self) -> &str {
        &self.id
    }

    fn endpoint_info(&self, selector: &Selector) -> Option<&Endpoint> {
        self.definition.get(selector)
    }

    fn resource_enabled(&self, selector: &Selector) -> bool {
        self.enabled.as_ref().is_none_or(|enabled| enabled(selector))
    }

    fn cache_control_enabled(&self, selector: &Selector) -> Option<String> {
        self.cache_control.get(selector).cloned()
    }

    fn resource_cors(&self) -> Option<&CorsPolicy> {
        self.cors.as_ref().or(self.settings.cors.as_ref())
    }

    fn resource_csrf(&self) -> Option<&CsrfPolicy> {
        self.csrf.as_ref().or(self.settings.csrf.as_ref())
    }
}

impl fmt::Debug for ResourceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntity")
            .field("id", &self.id)
            .field("definition", &self.definition)
            .field("cors", &self.cors)
            .field("csrf", &self.csrf)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`ResourceEntity`]. Obtain via
/// [`ResourceEntity::builder`].
#[derive(Default)]
pub struct ResourceBuilder {
    id: Option<String>,
    definition: ResourceDefinition,
    duplicates: Vec<String>,
    cors: Option<CorsPolicy>,
    csrf: Option<CsrfPolicy>,
    settings: Arc<ServiceSettings>,
    cache_control: HashMap<Selector, String>,
    enabled: Option<EnabledFn>,
}

impl ResourceBuilder {
    /// The path segment the resource is mounted under. Required.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// One of `index`, `create`, `retrieve`, `update`, `delete`, `options`.
    pub fn operation(self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoint(EndpointType::Operations, name.into(), endpoint)
    }

    /// Collection-level action: `POST /<service>/<resource>/<name>`.
    pub fn action(self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoint(EndpointType::Actions, name.into(), endpoint)
    }

    /// Instance-level action: `POST /<service>/<resource>/<id>/<name>`.
    pub fn targeted_action(self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoint(EndpointType::TargetedActions, name.into(), endpoint)
    }

    pub fn cors(mut self, policy: CorsPolicy) -> Self {
        self.cors = Some(policy);
        self
    }

    pub fn csrf(mut self, policy: CsrfPolicy) -> Self {
        self.csrf = Some(policy);
        self
    }

    /// Fallback policies. Set by the service when the resource is registered.
    pub fn settings(mut self, settings: Arc<ServiceSettings>) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache_control(mut self, selector: Selector, policy: impl Into<String>) -> Self {
        self.cache_control.insert(selector, policy.into());
        self
    }

    /// Replaces the always-enabled default of [`Resource::resource_enabled`].
    pub fn enabled<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Selector) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Box::new(predicate));
        self
    }

    /// Fails when no id was set or an endpoint name was registered twice.
    pub fn build(self) -> Result<ResourceEntity, Error> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("Resource id is not defined".to_owned()))?;

        if !self.duplicates.is_empty() {
            return Err(Error::Config(format!(
                "resource `{id}` defines duplicate endpoints: {}",
                self.duplicates.join(", "),
            )));
        }

        Ok(ResourceEntity {
            id,
            definition: self.definition,
            cors: self.cors,
            csrf: self.csrf,
            settings: self.settings,
            cache_control: self.cache_control,
            enabled: self.enabled,
        })
    }

    fn endpoint(mut self, kind: EndpointType, name: String, endpoint: Endpoint) -> Self {
        if !self.definition.insert(kind, name.clone(), endpoint) {
            self.duplicates.push(format!("{kind}/{name}"));
        }
        self
    }
}
