//! Per-request context: request id and request metadata, built once when a request
//! arrives and carried through execution, responses and log records.

use axum::http::{header, HeaderMap, Method, Uri};
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;

use crate::gateway::protocol::ExecResult;

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    /// Percent-decoded request path; route keys are matched against it.
    pub path: String,
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: String,
}

impl RequestContext {
    pub fn new(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method: method.clone(),
            path: percent_decode_str(uri.path())
                .decode_utf8_lossy()
                .into_owned(),
            remote_addr,
            user_agent,
        }
    }

    fn ip(&self) -> String {
        self.remote_addr
            .map(|a| a.ip().to_string())
            .unwrap_or_default()
    }

    /// One record per completed request or background execution.
    pub fn log_result(&self, result: &ExecResult) {
        log::info!(
            "request_id={} method={} path={} ip={} user_agent={:?} status={} output={:?} error={:?}",
            self.request_id,
            self.method,
            self.path,
            self.ip(),
            self.user_agent,
            result.status,
            result.output,
            result.error
        );
    }

    /// Record for a callback acknowledgement (no result yet).
    pub fn log_ack(&self, status: u16, callback_url: &str) {
        log::info!(
            "request_id={} method={} path={} ip={} user_agent={:?} status={} callback_url={}",
            self.request_id,
            self.method,
            self.path,
            self.ip(),
            self.user_agent,
            status,
            callback_url
        );
    }
}
