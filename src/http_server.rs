//! HTTP server implementation using Axum.

use crate::client_ip::resolve_client_ip;
use crate::error::{AppError, AppResult};
use crate::log_store::LogFailurePolicy;
use crate::render::Page;
use crate::sanitize::sanitize;
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        ConnectInfo, Query, Request, State,
    },
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Form, Json, Router,
};
use serde::Serialize;
use std::any::Any;
use std::net::SocketAddr;
use tokio::time::interval;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Client address resolved by the rate-limit middleware.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    db_healthy: bool,
}

/// Decoded `name=value` pairs, in the order they were sent.
type Pairs = Vec<(String, String)>;

/// Last value sent for `name`; repeated fields do not fail the request.
fn last_value(pairs: Pairs, name: &str) -> Option<String> {
    pairs
        .into_iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// Build the router: the form page on `/` (rate limited) and `/health`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_form).post(submit))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(health))
        .layer(CatchPanicLayer::custom(panic_page))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Run the HTTP server on `addr` until a shutdown signal arrives.
pub async fn run_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    // Expired rate-limit counters are dropped once per window.
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = interval(limiter.limits().window);
        loop {
            interval.tick().await;
            limiter.purge_expired();
        }
    });

    let app = router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn rate_limit(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = resolve_client_ip(req.headers(), peer);

    if !state.limiter.allow(&ip, req.method()) {
        return Err(AppError::RateLimited { ip });
    }

    req.extensions_mut().insert(ClientIp(ip));
    Ok(next.run(req).await)
}

async fn show_form() -> Html<String> {
    Page::form().render()
}

async fn submit(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    query: Result<Query<Pairs>, QueryRejection>,
    form: Result<Form<Pairs>, FormRejection>,
) -> AppResult<Html<String>> {
    // A query or body that cannot be decoded counts as absent.
    let query = query.unwrap_or_else(|rejection| {
        warn!(ip = %ip, error = %rejection, "Unreadable query string");
        Query(Vec::new())
    });
    let form = form.unwrap_or_else(|rejection| {
        warn!(ip = %ip, error = %rejection, "Unreadable form body");
        Form(Vec::new())
    });

    let is_debug = last_value(query.0, "debug").as_deref() == Some("true");
    let raw_text = last_value(form.0, "text").unwrap_or_default();
    let sanitized_text = sanitize(&raw_text);
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    info!(ip = %ip, debug = is_debug, input_len = sanitized_text.len(), "POST /");

    if let Err(e) = state.logs.record(&ip, user_agent, &sanitized_text).await {
        match state.log_failure {
            LogFailurePolicy::Abort => return Err(e.into()),
            LogFailurePolicy::Continue => {
                warn!(error = %e, ip = %ip, "Request log write failed, continuing");
            }
        }
    }

    let result = state.executor.execute(&sanitized_text, is_debug).await;
    info!(ip = %ip, success = result.is_success(), "POST / - done");

    Ok(Page::from_result(result, raw_text, sanitized_text).render())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        db_healthy: state.logs.ping().await,
    })
}

fn panic_page(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(details = %details, "Handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, Page::error(details).render()).into_response()
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
