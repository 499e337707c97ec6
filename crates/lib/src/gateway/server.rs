//! Gateway HTTP server: one POST endpoint per configured route.

use crate::command::{self, RequestParam};
use crate::config::{Config, RouteTable};
use crate::exec;
use crate::gateway::callback;
use crate::gateway::context::{RequestContext, REQUEST_ID_HEADER};
use crate::gateway::error::GatewayError;
use crate::gateway::protocol::{CallbackAck, ExecResult};
use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::Response,
    Router,
};
use futures_util::{future, stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Shared state for the gateway: the route table (read-only) and the HTTP client for callbacks.
#[derive(Clone)]
pub struct GatewayState {
    pub routes: Arc<RouteTable>,
    pub http: reqwest::Client,
}

impl GatewayState {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
            http: reqwest::Client::new(),
        }
    }
}

/// Build the router. Every path and method lands in [`handle`]; routing is by exact path
/// against the route table. Request bodies are not size-limited.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
}

/// Run the gateway server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (e.g. Ctrl+C). Callback executions still running at that
/// point are abandoned.
pub async fn run_gateway(config: Config) -> Result<()> {
    if config.routes.is_empty() {
        log::warn!("no routes configured; every request will get 404");
    }
    for (path, spec) in config.routes.iter() {
        log::debug!("route {} -> {}", path, spec.command);
    }
    let route_count = config.routes.len();
    let app = router(GatewayState::new(config.routes));

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} ({} route(s))", bind_addr, route_count);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// Entry point for every request: build the context, then run the pipeline.
async fn handle(
    State(state): State<GatewayState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let ctx = RequestContext::new(&method, &uri, &headers, remote.map(|ConnectInfo(a)| a));
    match process(&state, &ctx, &method, body).await {
        Ok(resp) => resp,
        Err(e) => reject(&ctx, e),
    }
}

/// Method check, route lookup, body parse, authorization, merge, then sync or callback run.
async fn process(
    state: &GatewayState,
    ctx: &RequestContext,
    method: &Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    if *method != Method::POST {
        return Err(GatewayError::MethodNotAllowed);
    }
    let spec = state
        .routes
        .get(&ctx.path)
        .ok_or(GatewayError::RouteNotFound)?;
    let body = body.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let param = RequestParam::from_body(&body)?;
    command::authorize(spec, &param)?;
    let cmd = command::merge(spec, &param);

    if let Some(url) = param.callback() {
        let ack = CallbackAck {
            request_id: ctx.request_id.clone(),
            url: url.to_string(),
        };
        let payload = encode(&ack).map_err(|e| GatewayError::Internal(e.to_string()))?;
        let (acked_tx, acked_rx) = oneshot::channel();
        callback::dispatch(
            state.http.clone(),
            ctx.clone(),
            cmd,
            url.to_string(),
            acked_rx,
        );
        ctx.log_ack(StatusCode::OK.as_u16(), url);
        return Ok(ack_response(ctx, payload, acked_tx));
    }

    let execution = exec::run(&cmd).await;
    let result = ExecResult::executed(&ctx.request_id, &execution);
    Ok(result_response(ctx, &result))
}

fn reject(ctx: &RequestContext, err: GatewayError) -> Response {
    let status = err.status();
    let result = ExecResult::rejected(&ctx.request_id, err.to_string(), status.as_u16());
    let mut resp = result_response(ctx, &result);
    if matches!(err, GatewayError::MethodNotAllowed) {
        resp.headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("POST"));
    }
    resp
}

/// Write `result` as the JSON body with its own status, and log it.
fn result_response(ctx: &RequestContext, result: &ExecResult) -> Response {
    ctx.log_result(result);
    let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::OK);
    match encode(result) {
        Ok(bytes) => json_response(ctx, status, Body::from(bytes)),
        Err(e) => {
            log::error!("request_id={} encoding result: {}", ctx.request_id, e);
            let fallback = ExecResult::rejected(&ctx.request_id, e.to_string(), 500);
            let bytes = encode(&fallback).unwrap_or_default();
            json_response(ctx, StatusCode::INTERNAL_SERVER_ERROR, Body::from(bytes))
        }
    }
}

/// Ack body that fires `acked` once the body has been fully handed to the connection
/// (or dropped because the client went away).
fn ack_response(ctx: &RequestContext, payload: Vec<u8>, acked: oneshot::Sender<()>) -> Response {
    let done = stream::once(async move {
        let _ = acked.send(());
    })
    .filter_map(|()| future::ready(None::<Result<Bytes, Infallible>>));
    let body = stream::once(future::ready(Ok::<_, Infallible>(Bytes::from(payload)))).chain(done);
    json_response(ctx, StatusCode::OK, Body::from_stream(body))
}

fn json_response(ctx: &RequestContext, status: StatusCode, body: Body) -> Response {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(v) = HeaderValue::from_str(&ctx.request_id) {
        headers.insert(REQUEST_ID_HEADER, v);
    }
    resp
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}
