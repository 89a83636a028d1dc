//! Minimal restmount example: one service, one resource, every endpoint kind.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users?limit=1
//!   curl http://localhost:3000/api/users/42
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/api/users/42/ban
//!   curl -X DELETE http://localhost:3000/api/users/42

use std::sync::Arc;

use restmount::{
    ArgumentDef, ArgumentSource, Arguments, CorsPolicy, Endpoint, Reply, ResourceEntity,
    RestServices, RestServicesConfig, Router, Selector, Server, ServiceConfig, ServiceError,
    ServiceSettings,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), restmount::Error> {
    tracing_subscriber::fmt::init();

    let users = ResourceEntity::builder()
        .id("users")
        .operation(
            "index",
            Endpoint::new(index)
                .argument(ArgumentDef::new("limit", ArgumentSource::Param("limit".into())).int().default_value(20)),
        )
        .operation(
            "retrieve",
            Endpoint::new(retrieve).argument(ArgumentDef::new("id", ArgumentSource::Path(0)).int()),
        )
        .operation(
            "create",
            Endpoint::new(create).argument(ArgumentDef::new("name", ArgumentSource::Field("name".into()))),
        )
        .operation(
            "delete",
            Endpoint::new(delete).argument(ArgumentDef::new("id", ArgumentSource::Path(0)).int()),
        )
        .targeted_action(
            "ban",
            Endpoint::new(ban).argument(ArgumentDef::new("id", ArgumentSource::Path(0)).int()),
        )
        .cache_control(Selector::operation("index"), "public, max-age=30");

    let settings = ServiceSettings {
        cors: Some(CorsPolicy::allow_origins(["http://localhost:8080"])),
        csrf: None,
    };

    let services = Arc::new(RestServices::new(
        RestServicesConfig::new()
            .debug(true)
            .service(ServiceConfig::new("main", "api").label("Demo API").settings(settings).entity(users)),
    )?);

    let app = services.mount(Router::new())?;
    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// GET /api/users?limit=N
async fn index(args: Arguments) -> Result<Reply, ServiceError> {
    let limit = args.i64("limit").unwrap_or(20).max(0) as usize;
    let users: Vec<_> = ["alice", "bob", "carol"].into_iter().take(limit).collect();
    Ok(Reply::new(json!(users)))
}

// GET /api/users/:id
async fn retrieve(args: Arguments) -> Result<Reply, ServiceError> {
    let id = args.i64("id").ok_or_else(|| ServiceError::bad_request("id must be numeric"))?;
    Ok(Reply::new(json!({ "id": id, "name": "alice" })))
}

// POST /api/users
async fn create(args: Arguments) -> Result<Reply, ServiceError> {
    let name = args.str("name").unwrap_or_default();
    args.response().set_header("location", "/api/users/99");
    Ok(Reply::new(json!({ "id": 99, "name": name })))
}

// DELETE /api/users/:id → 200, no body
async fn delete(_args: Arguments) -> Result<Reply, ServiceError> {
    Ok(Reply::empty())
}

// POST /api/users/:id/ban
async fn ban(args: Arguments) -> Result<Reply, ServiceError> {
    Ok(Reply::new(json!({ "banned": args.i64("id") })))
}
