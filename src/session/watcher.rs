//! Remote session watcher.
//!
//! Polls the session document and the current slide's response collection,
//! turning them into coordinator events: a changed slide pointer becomes a
//! `RemoteSlide` event, each previously unseen response becomes a `Tap`. The
//! loop reconnects with exponential backoff and prefers stale data over
//! giving up; the coordinator does its own slide/staleness filtering, so a
//! duplicate or late event here is harmless.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{SessionClient, SessionSnapshot};
use crate::coordinator::CoordinatorHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(1_000);
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

pub struct ResponseWatcher {
    client: Arc<dyn SessionClient>,
    session_id: String,
    handle: CoordinatorHandle,

    last_snapshot: Option<SessionSnapshot>,
    watched_slide: Option<u64>,
    seen_responses: HashSet<String>,
    consecutive_failures: u32,
}

impl ResponseWatcher {
    pub fn spawn(
        client: Arc<dyn SessionClient>,
        session_id: String,
        handle: CoordinatorHandle,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let watcher = Self {
            client,
            session_id,
            handle,
            last_snapshot: None,
            watched_slide: None,
            seen_responses: HashSet::new(),
            consecutive_failures: 0,
        };
        tokio::spawn(watcher.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Watching session '{}' for responses", self.session_id);

        loop {
            let delay = match self.consecutive_failures {
                0 => POLL_INTERVAL,
                failures => backoff_delay(failures),
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Response watcher stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.poll_once().await {
                Ok(()) => {
                    if self.consecutive_failures > 0 {
                        tracing::info!("Session subscription recovered");
                    }
                    self.consecutive_failures = 0;
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    tracing::warn!(
                        "Session poll failed ({} in a row): {err}; retrying in {:?}",
                        self.consecutive_failures,
                        backoff_delay(self.consecutive_failures)
                    );
                }
            }
        }
    }

    async fn poll_once(&mut self) -> crate::session::SessionResult<()> {
        let snapshot = self.client.fetch_session(&self.session_id).await?;

        if self.last_snapshot.as_ref() != Some(&snapshot) {
            if snapshot.slide_index != self.watched_slide {
                // New slide: earlier responses are inert, stop tracking them.
                self.watched_slide = snapshot.slide_index;
                self.seen_responses.clear();
            }
            self.handle.remote_slide(snapshot.clone()).await;
            self.last_snapshot = Some(snapshot);
        }

        let Some(slide_index) = self.watched_slide else {
            return Ok(());
        };

        let responses = self
            .client
            .fetch_tap_responses(&self.session_id, slide_index)
            .await?;

        for response in responses {
            if self.seen_responses.insert(response.id.clone()) {
                self.handle.tap(response).await;
            }
        }

        Ok(())
    }
}

fn backoff_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(4);
    BACKOFF_MAX.min(BACKOFF_BASE * 2u32.pow(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(50), Duration::from_secs(30));
    }
}
