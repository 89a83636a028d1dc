use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use restmount::{
    ArgumentDef, ArgumentSource, Arguments, CorsPolicy, CsrfPolicy, Endpoint, MemorySession,
    Method, Reply, Request, Resource, ResourceEntity, Response, RestServices, RestServicesConfig,
    Router, Selector, ServiceConfig, ServiceError, ServiceSettings, set_error,
};
use serde_json::{Value, json};

// --- Fixtures ---

#[derive(Default)]
struct Calls {
    index: AtomicUsize,
    create: AtomicUsize,
    ban: AtomicUsize,
}

fn users(calls: Arc<Calls>) -> restmount::ResourceBuilder {
    let index_calls = Arc::clone(&calls);
    let create_calls = Arc::clone(&calls);
    let ban_calls = calls;

    ResourceEntity::builder()
        .id("users")
        .operation(
            "index",
            Endpoint::new(move |args: Arguments| {
                let calls = Arc::clone(&index_calls);
                async move {
                    calls.index.fetch_add(1, Ordering::SeqCst);
                    let limit = args.i64("limit").unwrap_or_default();
                    Ok::<_, ServiceError>(Reply::new(json!({ "users": ["alice", "bob"], "limit": limit })))
                }
            })
            .argument(ArgumentDef::new("limit", ArgumentSource::Param("limit".into())).int().default_value(10)),
        )
        .operation(
            "create",
            Endpoint::new(move |args: Arguments| {
                let calls = Arc::clone(&create_calls);
                async move {
                    calls.create.fetch_add(1, Ordering::SeqCst);
                    let name = args.str("name").unwrap_or_default().to_owned();
                    args.response().set_header("location", &format!("/api/users/{name}"));
                    Ok::<_, ServiceError>(Reply::empty())
                }
            })
            .argument(ArgumentDef::new("name", ArgumentSource::Field("name".into()))),
        )
        .operation(
            "delete",
            Endpoint::new(|_args: Arguments| async { Err::<Reply, _>(set_error(409, "user has open orders")) }),
        )
        .targeted_action(
            "ban",
            Endpoint::new(move |args: Arguments| {
                let calls = Arc::clone(&ban_calls);
                async move {
                    calls.ban.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ServiceError>(Reply::new(json!({ "banned": args.get("id").cloned() })))
                }
            })
            .argument(ArgumentDef::new("id", ArgumentSource::Path(0)).int()),
        )
        .cache_control(Selector::operation("index"), "max-age=30")
}

fn registry(calls: Arc<Calls>, settings: ServiceSettings) -> RestServices {
    let config = RestServicesConfig::new().service(
        ServiceConfig::new("main", "api")
            .label("Main API")
            .settings(settings)
            .entity(users(calls)),
    );
    RestServices::new(config).unwrap()
}

fn body(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn index_is_invoked_once_and_renders_result() {
    let calls = Arc::new(Calls::default());
    let services = registry(Arc::clone(&calls), ServiceSettings::default());

    let res = services.dispatch(Request::builder(Method::Get, "/api/users").build()).await;

    assert_eq!(res.status_code(), 200);
    assert_eq!(body(&res), json!({ "users": ["alice", "bob"], "limit": 10 }));
    assert_eq!(res.header("cache-control"), Some("max-age=30"));
    assert_eq!(calls.index.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_resource_is_404_without_callbacks() {
    let calls = Arc::new(Calls::default());
    let services = registry(Arc::clone(&calls), ServiceSettings::default());

    let res = services.dispatch(Request::builder(Method::Get, "/api/groups").build()).await;

    assert_eq!(res.status_code(), 404);
    assert_eq!(body(&res), json!({ "error": { "code": 404, "message": "Resource not found" } }));
    assert_eq!(calls.index.load(Ordering::SeqCst), 0);
    assert_eq!(calls.create.load(Ordering::SeqCst), 0);
    assert_eq!(calls.ban.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_selector_and_endpoint() {
    let services = registry(Arc::new(Calls::default()), ServiceSettings::default());

    let no_selector = services.dispatch(Request::builder(Method::Put, "/api/users").build()).await;
    assert_eq!(no_selector.status_code(), 500);

    let no_endpoint = services.dispatch(Request::builder(Method::Put, "/api/users/1").build()).await;
    assert_eq!(no_endpoint.status_code(), 404);
    assert_eq!(body(&no_endpoint)["error"]["message"], "Resource endpoint not found");
}

#[tokio::test]
async fn missing_required_argument_is_400() {
    let calls = Arc::new(Calls::default());
    let services = registry(Arc::clone(&calls), ServiceSettings::default());

    let res = services
        .dispatch(Request::builder(Method::Post, "/api/users").body(json!({})).build())
        .await;

    assert_eq!(res.status_code(), 400);
    assert_eq!(body(&res)["error"]["message"], "Unable to process resource arguments");
    assert_eq!(calls.create.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_reply_is_bodiless_200_with_endpoint_headers() {
    let services = registry(Arc::new(Calls::default()), ServiceSettings::default());

    let res = services
        .dispatch(Request::builder(Method::Post, "/api/users").body(json!({ "name": "carol" })).build())
        .await;

    assert_eq!(res.status_code(), 200);
    assert!(res.body().is_empty());
    assert_eq!(res.header("location"), Some("/api/users/carol"));
}

#[tokio::test]
async fn endpoint_errors_keep_their_code() {
    let services = registry(Arc::new(Calls::default()), ServiceSettings::default());

    let res = services.dispatch(Request::builder(Method::Delete, "/api/users/3").build()).await;

    assert_eq!(res.status_code(), 409);
    assert_eq!(body(&res), json!({ "error": { "code": 409, "message": "user has open orders" } }));
}

#[tokio::test]
async fn targeted_action_gets_coerced_id() {
    let calls = Arc::new(Calls::default());
    let services = registry(Arc::clone(&calls), ServiceSettings::default());

    let res = services.dispatch(Request::builder(Method::Post, "/api/users/17/ban").build()).await;

    assert_eq!(body(&res), json!({ "banned": 17 }));
    assert_eq!(calls.ban.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn service_cors_settings_apply_to_resources() {
    let settings = ServiceSettings {
        cors: Some(CorsPolicy::allow_origins(["https://app.example"])),
        csrf: None,
    };
    let services = registry(Arc::new(Calls::default()), settings);

    let allowed = services
        .dispatch(Request::builder(Method::Get, "/api/users").header("Origin", "https://app.example").build())
        .await;
    assert_eq!(allowed.header("access-control-allow-origin"), Some("https://app.example"));
    assert_eq!(allowed.header("vary"), Some("Origin"));

    let denied = services
        .dispatch(Request::builder(Method::Get, "/api/users").header("Origin", "https://evil.example").build())
        .await;
    assert_eq!(denied.status_code(), 200);
    assert_eq!(denied.header("access-control-allow-origin"), None);
}

#[tokio::test]
async fn preflight_is_204() {
    let settings = ServiceSettings { cors: Some(CorsPolicy::allow_all()), csrf: None };
    let services = registry(Arc::new(Calls::default()), settings);

    let res = services
        .dispatch(Request::builder(Method::Options, "/api/users/1").header("Origin", "https://x").build())
        .await;

    assert_eq!(res.status_code(), 204);
    assert!(res.body().is_empty());
    assert_eq!(res.header("access-control-allow-origin"), Some("https://x"));
}

#[tokio::test]
async fn csrf_token_gates_unsafe_methods() {
    let calls = Arc::new(Calls::default());
    let settings = ServiceSettings { cors: None, csrf: Some(CsrfPolicy::required()) };
    let services = registry(Arc::clone(&calls), settings);
    let session = MemorySession::shared();

    let safe = services
        .dispatch(Request::builder(Method::Get, "/api/users").session(session.clone()).build())
        .await;
    assert_eq!(safe.status_code(), 200);

    let rejected = services
        .dispatch(
            Request::builder(Method::Post, "/api/users")
                .header("x-csrf-token", "forged")
                .body(json!({ "name": "mallory" }))
                .session(session.clone())
                .build(),
        )
        .await;
    assert_eq!(rejected.status_code(), 401);
    assert_eq!(calls.create.load(Ordering::SeqCst), 0);

    let resource = services.service_by_name("main").unwrap().resource("users").unwrap();
    let token = resource.current_token(session.as_ref());
    let accepted = services
        .dispatch(
            Request::builder(Method::Post, "/api/users")
                .header("x-csrf-token", &token)
                .body(json!({ "name": "dave" }))
                .session(session)
                .build(),
        )
        .await;
    assert_eq!(accepted.status_code(), 200);
    assert_eq!(calls.create.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn text_clients_cannot_receive_results() {
    let services = registry(Arc::new(Calls::default()), ServiceSettings::default());

    let res = services
        .dispatch(Request::builder(Method::Get, "/api/users").header("Content-Type", "text/plain").build())
        .await;
    assert_eq!(res.status_code(), 400);

    let err = services
        .dispatch(Request::builder(Method::Get, "/api/nope").header("Content-Type", "text/plain").build())
        .await;
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.body(), b"Resource not found");
}

#[tokio::test]
async fn jsonp_wraps_result_in_callback() {
    let services = registry(Arc::new(Calls::default()), ServiceSettings::default());

    let res = services
        .dispatch(
            Request::builder(Method::Get, "/api/users?callback=render&limit=2")
                .header("Content-Type", "application/javascript")
                .build(),
        )
        .await;

    let text = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(text.starts_with("/**/ typeof render === 'function' && render("));
    assert!(text.contains(r#""limit":2"#));
}

#[test]
fn registry_rejects_duplicate_services_and_paths() {
    let dup_name = RestServicesConfig::new()
        .service(ServiceConfig::new("main", "api"))
        .service(ServiceConfig::new("main", "v2"));
    assert!(RestServices::new(dup_name).is_err());

    let dup_path = RestServicesConfig::new()
        .service(ServiceConfig::new("a", "api"))
        .service(ServiceConfig::new("b", "api"));
    assert!(RestServices::new(dup_path).is_err());
}

#[tokio::test]
async fn registry_exposes_services_and_mounts() {
    let config = RestServicesConfig::new()
        .debug(true)
        .service(ServiceConfig::new("main", "api").entity(users(Arc::new(Calls::default()))))
        .service(ServiceConfig::new("admin", "admin").entity(ResourceEntity::builder().id("audit")));
    let services = Arc::new(RestServices::new(config).unwrap());

    let names: Vec<_> = services.services().map(|s| s.service_name().to_owned()).collect();
    assert_eq!(names, ["main", "admin"]);
    assert_eq!(services.service_by_name("main").unwrap().service_path(), "api");
    assert_eq!(services.service_by_name("main").unwrap().service_label(), None);

    let router = services.mount(Router::new()).unwrap();
    let res = router.route(Request::builder(Method::Get, "/api/users/?limit=1").build()).await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(body(&res)["limit"], 1);

    let audit = router.route(Request::builder(Method::Get, "/admin/audit").build()).await;
    assert_eq!(audit.status_code(), 404);
    assert_eq!(body(&audit)["error"]["message"], "Resource endpoint not found");
}

#[test]
fn resources_without_id_fail_registration() {
    let config = RestServicesConfig::new()
        .service(ServiceConfig::new("main", "api").entity(ResourceEntity::builder()));
    let err = RestServices::new(config).unwrap_err();
    assert!(err.to_string().contains("Resource id is not defined"));
}
