//! Application wiring.
//!
//! Builds the component graph from a validated configuration, runs until
//! ctrl-c, then unwinds in reverse order: trigger sources stop listening, the
//! watcher loop is cancelled, the coordinator drains, the overlay window and
//! the hotkey registration are released with it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::capture::{ScreenGrabber, XcapGrabber};
use crate::config::Config;
use crate::coordinator::{CaptureCoordinator, CoordinatorConfig};
use crate::overlay::OverlaySurface;
use crate::session::{FirebaseSessionClient, ResponseWatcher};
use crate::triggers::{FileTrigger, HotkeyTrigger, HttpTrigger, TriggerSource};

/// Upper bound on one grab/upload/commit round before it counts as failed.
const PIPELINE_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn run(config: Config) -> anyhow::Result<()> {
    let account = config
        .load_service_account()
        .context("cloud credentials are not usable")?;
    tracing::info!(
        "Session '{}' in project '{}'",
        config.session_id,
        account.project_id
    );

    let grabber = Arc::new(
        XcapGrabber::new(config.monitor_index).context("screen capture is not available")?,
    );

    let overlay = OverlaySurface::create(
        config.overlay_mode,
        config.dot_style(),
        config.overlay_debug_bg,
        grabber.display(),
    );

    let client = Arc::new(FirebaseSessionClient::new(
        account.project_id,
        config.storage_bucket.clone(),
    ));

    let (mut coordinator, handle) = CaptureCoordinator::new(
        CoordinatorConfig {
            session_id: config.session_id.clone(),
            monitor_index: config.monitor_index,
            cooldown: config.cooldown(),
            ignore_past: config.ignore_past_window(),
            pipeline_timeout: PIPELINE_TIMEOUT,
        },
        client.clone(),
        grabber,
        overlay,
    );
    coordinator.seed_from_remote().await;
    let coordinator_task = tokio::spawn(coordinator.run());

    let watcher_cancel = CancellationToken::new();
    let watcher_task = ResponseWatcher::spawn(
        client,
        config.session_id.clone(),
        handle.clone(),
        watcher_cancel.clone(),
    );

    // Trigger sources are all optional; each failure degrades only itself.
    let mut sources: Vec<Box<dyn TriggerSource>> = Vec::new();
    if config.enable_hotkey {
        sources.push(Box::new(HotkeyTrigger::new(handle.clone())));
    }
    if config.http_trigger_port != 0 {
        sources.push(Box::new(HttpTrigger::new(
            config.http_trigger_port,
            config.http_trigger_path.clone(),
            handle.clone(),
        )));
    }
    if let Some(path) = &config.trigger_file {
        sources.push(Box::new(FileTrigger::new(path.clone(), handle.clone())));
    }

    let mut active: Vec<Box<dyn TriggerSource>> = Vec::new();
    for mut source in sources {
        match source.start().await {
            Ok(()) => active.push(source),
            Err(err) => tracing::warn!("{} trigger disabled: {err}", source.name()),
        }
    }
    if active.is_empty() {
        tracing::warn!("No trigger source is active; captures cannot be requested");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    for source in &mut active {
        source.shutdown().await;
    }
    watcher_cancel.cancel();
    let _ = watcher_task.await;

    handle.shutdown().await;
    let _ = coordinator_task.await;

    Ok(())
}
