//! File-sentinel trigger.
//!
//! Polls for a configured file; when it appears, a capture is requested and
//! the file removed. The file is the whole protocol, which makes this the
//! trigger of last resort for locked-down machines: `echo . > capture_now.txt`
//! from any shell works.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{TriggerResult, TriggerSource};
use crate::coordinator::{CoordinatorHandle, TriggerKind};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct FileTrigger {
    path: PathBuf,
    poll_interval: Duration,
    handle: CoordinatorHandle,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FileTrigger {
    pub fn new(path: PathBuf, handle: CoordinatorHandle) -> Self {
        Self::with_poll_interval(path, handle, POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        path: PathBuf,
        handle: CoordinatorHandle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            path,
            poll_interval,
            handle,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn poll_loop(
    path: PathBuf,
    poll_interval: Duration,
    handle: CoordinatorHandle,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("File trigger stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if !path.exists() {
            continue;
        }

        tracing::info!("Trigger file {} detected", path.display());
        let outcome = handle.request_capture(TriggerKind::File).await;
        tracing::debug!("File trigger outcome: {outcome:?}");

        // A locked file just means we try again next tick; the capture
        // cooldown absorbs the repeat.
        if let Err(err) = std::fs::remove_file(&path) {
            tracing::warn!("Could not remove trigger file {}: {err}", path.display());
        }
    }
}

#[async_trait]
impl TriggerSource for FileTrigger {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn start(&mut self) -> TriggerResult<()> {
        let task = tokio::spawn(poll_loop(
            self.path.clone(),
            self.poll_interval,
            self.handle.clone(),
            self.cancel.clone(),
        ));
        self.task = Some(task);

        tracing::info!(
            "File trigger ready - create {} to capture",
            self.path.display()
        );
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CaptureOutcome, Event};
    use tokio::sync::mpsc;

    fn counting_coordinator() -> (CoordinatorHandle, mpsc::Receiver<TriggerKind>) {
        let (handle, mut events) = CoordinatorHandle::for_tests();
        let (seen_tx, seen_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Event::Trigger { kind, reply } = event {
                    let _ = seen_tx.send(kind).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(CaptureOutcome::Completed { slide_index: 0 });
                    }
                }
            }
        });

        (handle, seen_rx)
    }

    #[tokio::test]
    async fn sentinel_file_triggers_capture_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("capture_now.txt");

        let (handle, mut seen) = counting_coordinator();
        let mut trigger = FileTrigger::with_poll_interval(
            sentinel.clone(),
            handle,
            Duration::from_millis(20),
        );
        trigger.start().await.unwrap();

        std::fs::write(&sentinel, ".").unwrap();

        let kind = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("poll loop never fired")
            .unwrap();
        assert_eq!(kind, TriggerKind::File);

        // The sentinel is consumed shortly after the request.
        for _ in 0..100 {
            if !sentinel.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!sentinel.exists());

        trigger.shutdown().await;
    }

    #[tokio::test]
    async fn absent_file_never_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("capture_now.txt");

        let (handle, mut seen) = counting_coordinator();
        let mut trigger = FileTrigger::with_poll_interval(
            sentinel,
            handle,
            Duration::from_millis(10),
        );
        trigger.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(seen.try_recv().is_err());

        trigger.shutdown().await;
    }
}
