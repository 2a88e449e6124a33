//! Loopback HTTP trigger.
//!
//! A tiny axum server bound to 127.0.0.1 only. `GET` on the configured
//! capture path runs a capture and reports the pipeline result in the status
//! code; `GET /ping` is for liveness probes and never triggers anything, so
//! monitoring a presenter machine cannot advance its slides.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{TriggerError, TriggerResult, TriggerSource};
use crate::coordinator::{CaptureOutcome, CoordinatorHandle, TriggerKind};

#[derive(Clone)]
struct HttpState {
    handle: CoordinatorHandle,
}

pub struct HttpTrigger {
    port: u16,
    capture_path: String,
    handle: CoordinatorHandle,
    cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpTrigger {
    pub fn new(port: u16, capture_path: impl Into<String>, handle: CoordinatorHandle) -> Self {
        Self {
            port,
            capture_path: capture_path.into(),
            handle,
            cancel: CancellationToken::new(),
            server: None,
            local_addr: None,
        }
    }

    /// Actual bound address, useful when the port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn handle_capture(State(state): State<HttpState>) -> (StatusCode, String) {
    match state.handle.request_capture(TriggerKind::Http).await {
        CaptureOutcome::Completed { slide_index } => (
            StatusCode::OK,
            format!("Slide {} captured and uploaded\n", slide_index + 1),
        ),
        CaptureOutcome::Cooldown { remaining_ms } => (
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Cooldown active - please wait {} seconds\n",
                remaining_ms.div_ceil(1_000)
            ),
        ),
        CaptureOutcome::Busy => (
            StatusCode::CONFLICT,
            "A capture is already in progress\n".to_string(),
        ),
        CaptureOutcome::Failed(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Capture failed: {reason}\n"),
        ),
        CaptureOutcome::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Shutting down\n".to_string(),
        ),
    }
}

async fn handle_ping() -> &'static str {
    "ok\n"
}

#[async_trait]
impl TriggerSource for HttpTrigger {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn start(&mut self) -> TriggerResult<()> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TriggerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| TriggerError::Bind {
            addr,
            source,
        })?;
        self.local_addr = Some(local_addr);

        let router = Router::new()
            .route(&self.capture_path, get(handle_capture))
            .route("/ping", get(handle_ping))
            .with_state(HttpState {
                handle: self.handle.clone(),
            });

        let cancel = self.cancel.clone();
        self.server = Some(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await;
            if let Err(err) = result {
                tracing::error!("HTTP trigger server error: {err}");
            }
        }));

        tracing::info!(
            "HTTP trigger listening on http://{}{}",
            local_addr,
            self.capture_path
        );
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Event;
    use tokio::sync::mpsc;

    /// Stand-in for the coordinator task: answers each trigger with the next
    /// scripted outcome and counts what it saw.
    fn scripted_coordinator(
        outcomes: Vec<CaptureOutcome>,
    ) -> (CoordinatorHandle, mpsc::Receiver<TriggerKind>) {
        let (handle, mut events) = CoordinatorHandle::for_tests();
        let (seen_tx, seen_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut outcomes = outcomes.into_iter();
            while let Some(event) = events.recv().await {
                if let Event::Trigger { kind, reply } = event {
                    let _ = seen_tx.send(kind).await;
                    if let Some(reply) = reply {
                        let outcome = outcomes.next().unwrap_or(CaptureOutcome::Busy);
                        let _ = reply.send(outcome);
                    }
                }
            }
        });

        (handle, seen_rx)
    }

    async fn get(url: String) -> (u16, String) {
        tokio::task::spawn_blocking(move || match ureq::get(&url).call() {
            Ok(response) => {
                let status = response.status();
                (status, response.into_string().unwrap_or_default())
            }
            Err(ureq::Error::Status(status, response)) => {
                (status, response.into_string().unwrap_or_default())
            }
            Err(err) => panic!("request failed: {err}"),
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn capture_path_reports_outcome_status() {
        let (handle, mut seen) = scripted_coordinator(vec![
            CaptureOutcome::Completed { slide_index: 0 },
            CaptureOutcome::Cooldown { remaining_ms: 1_500 },
        ]);

        let mut trigger = HttpTrigger::new(0, "/capture", handle);
        trigger.start().await.unwrap();
        let addr = trigger.local_addr().unwrap();

        let (status, body) = get(format!("http://{addr}/capture")).await;
        assert_eq!(status, 200);
        assert!(body.contains("Slide 1"));

        let (status, body) = get(format!("http://{addr}/capture")).await;
        assert_eq!(status, 429);
        assert!(body.contains("wait 2 seconds"));

        assert_eq!(seen.recv().await, Some(TriggerKind::Http));
        assert_eq!(seen.recv().await, Some(TriggerKind::Http));

        trigger.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ping_does_not_trigger_a_capture() {
        let (handle, mut seen) = scripted_coordinator(vec![]);

        let mut trigger = HttpTrigger::new(0, "/capture", handle);
        trigger.start().await.unwrap();
        let addr = trigger.local_addr().unwrap();

        let (status, body) = get(format!("http://{addr}/ping")).await;
        assert_eq!(status, 200);
        assert_eq!(body, "ok\n");

        assert!(seen.try_recv().is_err());
        trigger.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_pipeline_maps_to_500() {
        let (handle, _seen) =
            scripted_coordinator(vec![CaptureOutcome::Failed("upload broke".to_string())]);

        let mut trigger = HttpTrigger::new(0, "/capture", handle);
        trigger.start().await.unwrap();
        let addr = trigger.local_addr().unwrap();

        let (status, body) = get(format!("http://{addr}/capture")).await;
        assert_eq!(status, 500);
        assert!(body.contains("upload broke"));

        trigger.shutdown().await;
    }
}
