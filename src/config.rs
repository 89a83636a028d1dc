//! Startup configuration for the registry.
//!
//! Everything here is consumed once by [`RestServices::new`] and never
//! touched again; there is no hot reload.
//!
//! [`RestServices::new`]: crate::RestServices::new

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Error;
use crate::policy::{CorsPolicy, CsrfPolicy};
use crate::resource::{Resource, ResourceBuilder};
use crate::service::ServiceHooks;

/// Defaults shared by every resource of one service.
///
/// A resource's own policy wins; these apply only when the resource sets
/// none.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    pub cors: Option<CorsPolicy>,
    pub csrf: Option<CsrfPolicy>,
}

impl ServiceSettings {
    /// Parses settings from JSON, e.g. a section of an application config
    /// file.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Builds one resource once the service settings are known.
pub type ResourceFactory =
    Box<dyn FnOnce(Arc<ServiceSettings>) -> Result<Arc<dyn Resource>, Error> + Send>;

/// One named, path-prefixed group of resources.
pub struct ServiceConfig {
    pub(crate) name: String,
    pub(crate) label: Option<String>,
    pub(crate) path: String,
    pub(crate) settings: ServiceSettings,
    pub(crate) resources: Vec<ResourceFactory>,
    pub(crate) hooks: Option<Arc<dyn ServiceHooks>>,
}

impl ServiceConfig {
    /// `path` is the mount prefix without slashes, e.g. `"api"`.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            path: path.into(),
            settings: ServiceSettings::default(),
            resources: Vec::new(),
            hooks: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Registers a resource built by an arbitrary factory.
    pub fn resource<F, R>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<ServiceSettings>) -> Result<R, Error> + Send + 'static,
        R: Resource + 'static,
    {
        self.resources.push(Box::new(move |settings| {
            let resource: Arc<dyn Resource> = Arc::new(factory(settings)?);
            Ok(resource)
        }));
        self
    }

    /// Registers a [`ResourceEntity`](crate::ResourceEntity) that inherits
    /// this service's settings.
    pub fn entity(self, builder: ResourceBuilder) -> Self {
        self.resource(move |settings| builder.settings(settings).build())
    }

    /// Replaces the default `lookup_alter` / `endpoint_access` hooks.
    pub fn hooks(mut self, hooks: Arc<dyn ServiceHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("resources", &self.resources.len())
            .field("custom_hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Top-level registry configuration.
#[derive(Debug, Default)]
pub struct RestServicesConfig {
    pub(crate) debug: bool,
    pub(crate) services: Vec<ServiceConfig>,
}

impl RestServicesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log registration, mounting and dispatch at `info` instead of `debug`.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn service(mut self, service: ServiceConfig) -> Self {
        self.services.push(service);
        self
    }
}
