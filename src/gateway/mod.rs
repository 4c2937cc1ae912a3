//! Admin HTTP gateway.
//!
//! Request path, outermost first: request id, trace span, CORS, security headers,
//! client identity, rate limit, body limit, then the admin gate on every route
//! except `/health`.
//!
//! Clients are identified by the socket address. `x-forwarded-for` and
//! `x-real-ip` are only read when the gateway is told it sits behind a proxy.

pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod rate_limit;
pub mod sanitize;

pub use self::{
    auth::AdminGate,
    openapi::openapi,
    rate_limit::{FixedWindowRateLimiter, RateLimiter},
};

use crate::provider::SharedProvider;
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, MatchedPath, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, Method, Request,
    },
    middleware::{self, Next},
    response::Response,
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::{SetRequestHeaderLayer, SetResponseHeaderLayer},
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

/// Maximum accepted request body.
pub const BODY_LIMIT: usize = 10 * 1024;

pub const DEFAULT_PORT: u16 = 4000;

const REQUEST_ID: &str = "x-request-id";

const SECURITY_HEADERS: [(&str, &str); 7] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-dns-prefetch-control", "off"),
    ("x-permitted-cross-domain-policies", "none"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
];

pub struct Gateway {
    gate: Arc<AdminGate>,
    provider: SharedProvider,
    limiter: Arc<dyn RateLimiter>,
    allowed_origin: Option<HeaderValue>,
    trust_proxy: bool,
}

/// Caller address attached to every request, used for rate limiting and logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl Gateway {
    /// Gateway with the default admission policy and CORS open to any origin.
    #[must_use]
    pub fn new(gate: AdminGate, provider: SharedProvider) -> Self {
        Self {
            gate: Arc::new(gate),
            provider,
            limiter: Arc::new(FixedWindowRateLimiter::default()),
            allowed_origin: None,
            trust_proxy: false,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_allowed_origin(mut self, origin: HeaderValue) -> Self {
        self.allowed_origin = Some(origin);
        self
    }

    /// Identify clients by the first `x-forwarded-for` entry (or `x-real-ip`).
    /// Only safe when a reverse proxy overwrites those headers.
    #[must_use]
    pub fn with_trusted_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    #[must_use]
    pub fn router(&self) -> Router {
        let (public, _) = openapi::public_router().split_for_parts();
        let (admin, _) = openapi::admin_router().split_for_parts();

        let admin = admin.route_layer(middleware::from_fn_with_state(
            self.gate.clone(),
            auth::require_admin,
        ));

        let mut router = public
            .merge(admin)
            .layer(DefaultBodyLimit::max(BODY_LIMIT))
            .layer(Extension(self.provider.clone()))
            .layer(middleware::from_fn_with_state(
                self.limiter.clone(),
                rate_limit::enforce,
            ))
            .layer(middleware::from_fn_with_state(
                self.trust_proxy,
                identify_client,
            ));

        for (name, value) in SECURITY_HEADERS {
            router = router.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ));
        }

        let allow_origin = self
            .allowed_origin
            .clone()
            .map_or_else(AllowOrigin::any, AllowOrigin::exact);
        let cors = CorsLayer::new()
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_methods([Method::POST])
            .allow_origin(allow_origin);

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
    }
}

/// Start the server and run until Ctrl-C or SIGTERM.
///
/// # Errors
/// Return error if failed to bind or serve
pub async fn serve(port: u16, gateway: Gateway) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        gateway
            .router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Normalize `FRONTEND_URL` into a CORS origin (`scheme://host[:port]`).
///
/// # Errors
/// Returns an error if the URL is invalid or has no host.
pub fn frontend_origin(frontend_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(frontend_url).with_context(|| format!("Invalid frontend URL: {frontend_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend URL must include a valid host: {frontend_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

async fn identify_client(
    State(trust_proxy): State<bool>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = resolve_client(&request, trust_proxy);
    request.extensions_mut().insert(ClientAddr(client));
    next.run(request).await
}

/// Socket address of the caller, or the forwarded address when `trust_proxy` is set.
pub(crate) fn resolve_client<B>(request: &Request<B>, trust_proxy: bool) -> String {
    trust_proxy
        .then(|| forwarded_ip(request.headers()))
        .flatten()
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Caller address resolved by [`identify_client`].
pub(crate) fn client_origin<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ClientAddr>()
        .map_or_else(|| "unknown".to_string(), |ClientAddr(addr)| addr.clone())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}
