//! Callback mode: run a command in a detached task and POST its result to a caller URL.
//!
//! Delivery is at-most-once and best-effort. The task is not tracked, cannot be
//! cancelled and is never joined; shutting the gateway down abandons it. A failed
//! POST is logged and dropped, never retried.

use tokio::sync::oneshot;

use crate::command::EffectiveCommand;
use crate::exec;
use crate::gateway::context::RequestContext;
use crate::gateway::protocol::ExecResult;

/// How a callback POST ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The receiver answered (any HTTP status).
    Posted(u16),
    /// The request never got a response (connect error, DNS, invalid URL, ...).
    Failed(String),
}

/// Spawn the background execution. `acked` resolves (or is dropped) once the
/// acknowledgement has been handed to the connection; execution starts after that.
pub fn dispatch(
    client: reqwest::Client,
    ctx: RequestContext,
    cmd: EffectiveCommand,
    url: String,
    acked: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        // Err means the response body was dropped (e.g. client went away); run anyway.
        let _ = acked.await;
        let execution = exec::run(&cmd).await;
        let result = ExecResult::executed(&ctx.request_id, &execution);
        ctx.log_result(&result);
        deliver(&client, &ctx, &url, &result).await;
    });
}

/// POST the result as JSON to `url` once and log the outcome.
pub async fn deliver(
    client: &reqwest::Client,
    ctx: &RequestContext,
    url: &str,
    result: &ExecResult,
) -> Delivery {
    match client.post(url).json(result).send().await {
        Ok(resp) => {
            let status = resp.status();
            log::info!(
                "request_id={} callback_url={} callback_resp_status={}",
                ctx.request_id,
                url,
                status
            );
            Delivery::Posted(status.as_u16())
        }
        Err(e) => {
            log::error!(
                "request_id={} callback_url={} callback failed: {}",
                ctx.request_id,
                url,
                e
            );
            Delivery::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, Uri};

    fn ctx() -> RequestContext {
        let uri: Uri = "/cb".parse().unwrap();
        RequestContext::new(&Method::POST, &uri, &HeaderMap::new(), None)
    }

    /// Bind then drop to get a port with nothing listening.
    fn dead_url() -> String {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        format!("http://127.0.0.1:{}/hook", port)
    }

    fn touch(marker: &std::path::Path) -> EffectiveCommand {
        EffectiveCommand {
            command: "touch".to_string(),
            args: vec![marker.display().to_string()],
            envs: Vec::new(),
            dir: String::new(),
            stdin: String::new(),
        }
    }

    async fn wait_for(marker: &std::path::Path) -> bool {
        for _ in 0..100 {
            if marker.exists() {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn execution_waits_for_ack() {
        let marker = std::env::temp_dir().join(format!("cas-ack-{}", uuid::Uuid::new_v4()));
        let (acked_tx, acked_rx) = oneshot::channel();
        dispatch(reqwest::Client::new(), ctx(), touch(&marker), dead_url(), acked_rx);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!marker.exists(), "command ran before the ack was sent");

        acked_tx.send(()).unwrap();
        assert!(wait_for(&marker).await, "command did not run after the ack");
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn execution_runs_when_ack_is_dropped() {
        let marker = std::env::temp_dir().join(format!("cas-drop-{}", uuid::Uuid::new_v4()));
        let (acked_tx, acked_rx) = oneshot::channel::<()>();
        dispatch(reqwest::Client::new(), ctx(), touch(&marker), dead_url(), acked_rx);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!marker.exists());

        drop(acked_tx);
        assert!(wait_for(&marker).await, "command did not run after the ack was dropped");
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn unreachable_url_is_reported_not_retried() {
        let ctx = ctx();
        let result = ExecResult::rejected(&ctx.request_id, "", 200);
        let url = dead_url();
        let outcome = deliver(&reqwest::Client::new(), &ctx, &url, &result).await;
        assert!(matches!(outcome, Delivery::Failed(_)), "got {:?}", outcome);
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let ctx = ctx();
        let result = ExecResult::rejected(&ctx.request_id, "", 200);
        let outcome = deliver(&reqwest::Client::new(), &ctx, "not a url", &result).await;
        assert!(matches!(outcome, Delivery::Failed(_)));
    }
}
