//! # restmount
//!
//! Mounts resource CRUD and action endpoints onto one fixed REST URL
//! convention and dispatches requests to typed endpoint callbacks.
//!
//! ## The convention
//!
//! ```text
//! /<servicePath>/<resourceId>[/<identifierOrAction>[/<specifierOrTargetedAction>]]
//! ```
//!
//! | Request | Endpoint |
//! |---|---|
//! | `GET /api/users` | operation `index` |
//! | `GET /api/users/7` | operation `retrieve` |
//! | `POST /api/users` | operation `create` |
//! | `PUT /api/users/7` | operation `update` |
//! | `DELETE /api/users/7` | operation `delete` |
//! | `OPTIONS /api/users/7` | operation `options` |
//! | `POST /api/users/import` | action `import` |
//! | `POST /api/users/7/ban` | targeted action `ban` |
//!
//! Anything else is a `500`. There is no other routing.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use restmount::{
//!     ArgumentDef, ArgumentSource, Arguments, Endpoint, Reply, ResourceEntity,
//!     RestServices, RestServicesConfig, Router, Server, ServiceConfig, ServiceError,
//! };
//!
//! async fn retrieve(args: Arguments) -> Result<Reply, ServiceError> {
//!     let id = args.i64("id").ok_or_else(|| ServiceError::bad_request("id must be numeric"))?;
//!     Ok(Reply::new(serde_json::json!({ "id": id })))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restmount::Error> {
//!     let users = ResourceEntity::builder()
//!         .id("users")
//!         .operation(
//!             "retrieve",
//!             Endpoint::new(retrieve).argument(ArgumentDef::new("id", ArgumentSource::Path(0)).int()),
//!         );
//!
//!     let services = Arc::new(RestServices::new(
//!         RestServicesConfig::new().service(ServiceConfig::new("main", "api").entity(users)),
//!     )?);
//!
//!     let app = services.mount(Router::new())?;
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod arguments;
mod config;
mod endpoint;
mod error;
mod method;
mod policy;
mod request;
mod resource;
mod response;
mod router;
mod selector;
mod server;
mod service;
mod services;
mod session;
mod status;
mod url_info;

pub use arguments::{ArgumentDef, ArgumentSource, Arguments, Coercion, bind_arguments};
pub use config::{ResourceFactory, RestServicesConfig, ServiceConfig, ServiceSettings};
pub use endpoint::{Endpoint, EndpointFuture, Reply};
pub use error::{ArgumentError, Error, ServiceError, set_error};
pub use method::{Method, UnknownMethod};
pub use policy::{CorsPolicy, CsrfPolicy, DEFAULT_CSRF_HEADER, HeaderEntry};
pub use request::{Request, RequestBuilder};
pub use resource::{Access, Resource, ResourceBuilder, ResourceDefinition, ResourceEntity};
pub use response::{Response, ResponseBuilder, ResponseParts};
pub use router::Router;
pub use selector::{EndpointType, Selector, build_selector};
pub use server::{Server, SessionProvider};
pub use service::{AbortSignal, DefaultHooks, Dispatch, ServiceHandler, ServiceHooks};
pub use services::{ResponseFormat, RestServices, error_body, send_response};
pub use session::{MemorySession, Session};
pub use status::Status;
pub use url_info::UrlInfo;
