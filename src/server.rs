//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server stops accepting connections, lets every
//! in-flight connection finish, then returns from [`Server::serve`].
//!
//! When a client disconnects mid-request hyper drops the request future, so
//! no dispatch step after the current `.await` runs.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::session::Session;
use crate::status::Status;

/// Resolves the caller's session from the incoming request, typically from a
/// cookie.
pub type SessionProvider = Arc<dyn Fn(&Request) -> Option<Arc<dyn Session>> + Send + Sync>;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    sessions: Option<SessionProvider>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("invalid socket address `{addr}`: {e}")))?;
        Ok(Self { addr, sessions: None })
    }

    /// Attaches a session to every request before it is routed.
    pub fn sessions(mut self, provider: SessionProvider) -> Self {
        self.sessions = Some(provider);
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);
        let sessions = self.sessions.clone();

        info!(addr = %self.addr, "restmount listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let sessions = sessions.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let sessions = sessions.clone();
                            async move { dispatch(router, sessions, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("restmount stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one hyper request and produces one response. All failures become
/// HTTP statuses, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    sessions: Option<SessionProvider>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let Ok(method) = Method::try_from(req.method()) else {
        return Ok(Response::status(Status::MethodNotAllowed).into_inner());
    };
    let path = req.uri().path().to_owned();
    debug!(peer = %remote_addr, %method, %path, "request");

    let mut request = match into_request(method, req).await {
        Ok(request) => request,
        Err(status) => return Ok(Response::status(status).into_inner()),
    };
    if let Some(provider) = &sessions {
        let session = provider(&request);
        request.set_session(session);
    }

    Ok(router.route(request).await.into_inner())
}

/// Reads the body and decodes it according to its content type.
///
/// Empty bodies are `None`, JSON bodies are parsed, form bodies become an
/// object of strings, and anything else is kept as a string.
async fn into_request(
    method: Method,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<Request, Status> {
    let (parts, body) = req.into_parts();
    let original_url = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());

    let headers: Vec<(String, String)> = parts.headers.iter()
        .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
        .collect();

    let bytes = body
        .collect()
        .await
        .map_err(|e| {
            debug!("failed to read request body: {e}");
            Status::BadRequest
        })?
        .to_bytes();

    let content_type = headers.iter()
        .find(|(k, _)| k == "content-type")
        .map(|(_, v)| v.as_str())
        .unwrap_or_default();

    let mut builder = Request::builder(method, &original_url);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = decode_body(content_type, &bytes)? {
        builder = builder.body(body);
    }
    Ok(builder.build())
}

fn decode_body(content_type: &str, bytes: &[u8]) -> Result<Option<Value>, Status> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if content_type.contains("json") {
        return serde_json::from_slice(bytes).map(Some).map_err(|_| Status::BadRequest);
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let form = url::form_urlencoded::parse(bytes)
            .into_owned()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Ok(Some(Value::Object(form)));
    }
    Ok(Some(Value::String(String::from_utf8_lossy(bytes).into_owned())))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C only on non-Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
