//! Capture/upload coordination
//!
//! The coordinator is the single writer for everything a slide transition
//! touches: the admission state machine, the slide sequence, and the overlay
//! dot set. Trigger sources, the response watcher and finished pipelines all
//! talk to it through one event channel, so ordering is whatever order the
//! events arrived in and no lock juggling is needed.
//!
//! An accepted capture runs as its own task (grab and encode on the blocking
//! pool, uploads through the session client) and reports back with a
//! completion event. Students only ever observe the slide pointer write, which
//! is the last pipeline stage; any earlier failure leaves the previous slide
//! authoritative.

pub mod state;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::capture::{self, CaptureError, ScreenGrabber};
use crate::overlay::OverlaySurface;
use crate::session::{SessionClient, SessionError, SessionSnapshot, SlidePointer, TapResponse};
use state::{CaptureState, TriggerDecision};

const JPEG_QUALITY: u8 = 85;
const EVENT_QUEUE_DEPTH: usize = 64;

/// Where a capture request came from; only used for logging and rejection
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Hotkey,
    Http,
    File,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Hotkey => write!(f, "hotkey"),
            TriggerKind::Http => write!(f, "http"),
            TriggerKind::File => write!(f, "file"),
        }
    }
}

/// Errors from one capture pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Screen capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Upload failed: {0}")]
    Upload(SessionError),

    #[error("Slide pointer write failed: {0}")]
    PointerWrite(SessionError),

    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker join failed: {0}")]
    Join(String),
}

/// What a trigger source hears back about its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The pipeline ran to completion and this slide is now live.
    Completed { slide_index: u64 },
    /// Rejected: inside the cooldown window of the last accepted capture.
    Cooldown { remaining_ms: u64 },
    /// Rejected: another capture is still in flight.
    Busy,
    /// Accepted but the pipeline failed; the previous slide stays current.
    Failed(String),
    /// The coordinator is gone.
    ShuttingDown,
}

/// A successfully committed slide
#[derive(Debug, Clone)]
pub struct CommittedSlide {
    pub index: u64,
    pub image_url: String,
}

/// Everything that can reach the coordinator, in arrival order
pub enum Event {
    Trigger {
        kind: TriggerKind,
        reply: Option<oneshot::Sender<CaptureOutcome>>,
    },
    Tap(TapResponse),
    RemoteSlide(SessionSnapshot),
    CaptureDone {
        capture_id: Uuid,
        result: Result<CommittedSlide, PipelineError>,
    },
    Shutdown,
}

/// Cloneable sender half handed to trigger sources and the watcher
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Event>,
}

impl CoordinatorHandle {
    /// Request a capture and wait for its outcome. Rejections come back
    /// immediately; accepted requests resolve when the pipeline finishes.
    pub async fn request_capture(&self, kind: TriggerKind) -> CaptureOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        let event = Event::Trigger {
            kind,
            reply: Some(reply_tx),
        };
        if self.tx.send(event).await.is_err() {
            return CaptureOutcome::ShuttingDown;
        }
        reply_rx.await.unwrap_or(CaptureOutcome::ShuttingDown)
    }

    /// Fire-and-forget capture request for callers outside the runtime
    /// (the hotkey thread). The outcome is logged by the coordinator.
    pub fn request_capture_blocking(&self, kind: TriggerKind) {
        let _ = self.tx.blocking_send(Event::Trigger { kind, reply: None });
    }

    pub async fn tap(&self, response: TapResponse) {
        let _ = self.tx.send(Event::Tap(response)).await;
    }

    pub async fn remote_slide(&self, snapshot: SessionSnapshot) {
        let _ = self.tx.send(Event::RemoteSlide(snapshot)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown).await;
    }

    /// Bare handle + receiver pair for driving trigger sources in tests.
    #[cfg(test)]
    pub(crate) fn for_tests() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        (Self { tx }, rx)
    }
}

/// Coordinator settings, extracted from the application configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub session_id: String,
    pub monitor_index: usize,
    /// Minimum time between accepted captures.
    pub cooldown: Duration,
    /// Drop tap responses older than startup minus this window; `None`
    /// disables the filter.
    pub ignore_past: Option<Duration>,
    /// Upper bound on one pipeline run before it counts as failed.
    pub pipeline_timeout: Duration,
}

pub struct CaptureCoordinator {
    rx: mpsc::Receiver<Event>,
    events: mpsc::Sender<Event>,
    client: Arc<dyn SessionClient>,
    grabber: Arc<dyn ScreenGrabber>,
    overlay: OverlaySurface,
    config: CoordinatorConfig,
    started_at: DateTime<Utc>,

    state: CaptureState,
    /// Slide students currently see; `None` until the first capture or
    /// remote snapshot.
    current_slide: Option<u64>,
    next_slide: u64,
    slides: Vec<String>,
    in_flight: Option<Uuid>,
    pending_reply: Option<oneshot::Sender<CaptureOutcome>>,
}

impl CaptureCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        client: Arc<dyn SessionClient>,
        grabber: Arc<dyn ScreenGrabber>,
        overlay: OverlaySurface,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let handle = CoordinatorHandle { tx: tx.clone() };
        let state = CaptureState::new(config.cooldown);

        let coordinator = Self {
            rx,
            events: tx,
            client,
            grabber,
            overlay,
            config,
            started_at: Utc::now(),
            state,
            current_slide: None,
            next_slide: 0,
            slides: Vec::new(),
            in_flight: None,
            pending_reply: None,
        };
        (coordinator, handle)
    }

    /// Continue an existing session: adopt the remote slide sequence so a
    /// helper restart does not reset the index. Failures are logged and the
    /// session starts fresh; nothing here is fatal.
    pub async fn seed_from_remote(&mut self) {
        match self.client.fetch_session(&self.config.session_id).await {
            Ok(snapshot) => {
                self.current_slide = snapshot.slide_index;
                self.next_slide = next_index(&snapshot);
                self.slides = snapshot.slides;
                tracing::info!(
                    "Session '{}': {} existing slides, current index {:?}",
                    self.config.session_id,
                    self.slides.len(),
                    self.current_slide
                );
            }
            Err(err) => {
                tracing::warn!("Could not read existing session state: {err}; starting fresh");
            }
        }
    }

    /// Process events until shutdown. Consumes the coordinator; the handle
    /// is the only way in from here.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                Event::Trigger { kind, reply } => self.handle_trigger(kind, reply),
                Event::Tap(response) => self.handle_tap(response),
                Event::RemoteSlide(snapshot) => self.handle_remote_slide(snapshot),
                Event::CaptureDone { capture_id, result } => {
                    self.handle_capture_done(capture_id, result)
                }
                Event::Shutdown => break,
            }
        }
        self.overlay.shutdown();
        tracing::debug!("Coordinator stopped");
    }

    fn handle_trigger(&mut self, kind: TriggerKind, reply: Option<oneshot::Sender<CaptureOutcome>>) {
        match self.state.on_trigger(Instant::now()) {
            TriggerDecision::Accepted => {
                let capture_id = Uuid::new_v4();
                tracing::info!(
                    "Capture accepted from {} trigger (slide index {}, capture {})",
                    kind,
                    self.next_slide,
                    capture_id
                );
                self.in_flight = Some(capture_id);
                self.pending_reply = reply;
                self.start_pipeline(capture_id);
            }
            TriggerDecision::Busy => {
                tracing::info!("{} trigger rejected: capture already in progress", kind);
                respond(reply, CaptureOutcome::Busy);
            }
            TriggerDecision::Cooldown { remaining } => {
                tracing::info!(
                    "{} trigger rejected: cooldown active, {}ms remaining",
                    kind,
                    remaining.as_millis()
                );
                respond(
                    reply,
                    CaptureOutcome::Cooldown {
                        remaining_ms: remaining.as_millis() as u64,
                    },
                );
            }
        }
    }

    fn start_pipeline(&self, capture_id: Uuid) {
        let client = self.client.clone();
        let grabber = self.grabber.clone();
        let session_id = self.config.session_id.clone();
        let monitor_index = self.config.monitor_index;
        let slide_index = self.next_slide;
        let slides = self.slides.clone();
        let events = self.events.clone();
        let timeout = self.config.pipeline_timeout;

        tokio::spawn(async move {
            let work = run_pipeline(client, grabber, session_id, monitor_index, slide_index, slides);
            let result = match tokio::time::timeout(timeout, work).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Timeout(timeout)),
            };
            let _ = events.send(Event::CaptureDone { capture_id, result }).await;
        });
    }

    fn handle_capture_done(
        &mut self,
        capture_id: Uuid,
        result: Result<CommittedSlide, PipelineError>,
    ) {
        if self.in_flight != Some(capture_id) {
            tracing::warn!("Ignoring completion of superseded capture {capture_id}");
            return;
        }
        self.in_flight = None;
        self.state.on_finished();
        let reply = self.pending_reply.take();

        match result {
            Ok(slide) => {
                self.current_slide = Some(slide.index);
                self.next_slide = slide.index + 1;
                self.slides.push(slide.image_url.clone());
                // New slide: everything on screen belongs to the old one.
                self.overlay.clear();
                tracing::info!("Slide {} is live: {}", slide.index + 1, slide.image_url);
                respond(
                    reply,
                    CaptureOutcome::Completed {
                        slide_index: slide.index,
                    },
                );
            }
            Err(err) => {
                tracing::error!("Capture failed: {err}; previous slide stays current");
                respond(reply, CaptureOutcome::Failed(err.to_string()));
            }
        }
    }

    fn handle_tap(&mut self, response: TapResponse) {
        let Some(current) = self.current_slide else {
            tracing::debug!("Dropping tap {}: no current slide yet", response.id);
            return;
        };
        if response.slide_index != current {
            tracing::debug!(
                "Dropping tap {} for slide {} (current is {})",
                response.id,
                response.slide_index,
                current
            );
            return;
        }
        if let Some(window) = self.config.ignore_past {
            let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
            if response.created_at < self.started_at - window {
                tracing::debug!("Dropping tap {} from before startup", response.id);
                return;
            }
        }

        let display = self.grabber.display();
        let (x_px, y_px) = capture::normalized_to_pixel(response.x, response.y, display);
        self.overlay.add_dot(x_px, y_px);
        tracing::debug!(
            "Dot at ({}, {}) from normalized ({:.3}, {:.3})",
            x_px,
            y_px,
            response.x,
            response.y
        );
    }

    fn handle_remote_slide(&mut self, snapshot: SessionSnapshot) {
        if snapshot.slide_index == self.current_slide {
            return;
        }
        tracing::info!(
            "Slide pointer moved remotely to {:?}; clearing overlay",
            snapshot.slide_index
        );
        self.current_slide = snapshot.slide_index;
        self.next_slide = next_index(&snapshot);
        self.slides = snapshot.slides;
        self.overlay.clear();
    }
}

/// Next free slide index for a session snapshot. Indexes follow the slide
/// list, but never reuse the currently shown index.
fn next_index(snapshot: &SessionSnapshot) -> u64 {
    let from_list = snapshot.slides.len() as u64;
    match snapshot.slide_index {
        Some(current) => from_list.max(current + 1),
        None => from_list,
    }
}

fn respond(reply: Option<oneshot::Sender<CaptureOutcome>>, outcome: CaptureOutcome) {
    if let Some(tx) = reply {
        let _ = tx.send(outcome);
    }
}

/// One capture pipeline run: grab, encode, upload, commit the pointer.
async fn run_pipeline(
    client: Arc<dyn SessionClient>,
    grabber: Arc<dyn ScreenGrabber>,
    session_id: String,
    monitor_index: usize,
    slide_index: u64,
    mut slides: Vec<String>,
) -> Result<CommittedSlide, PipelineError> {
    let display = grabber.display().clone();

    let frame = tokio::task::spawn_blocking({
        let grabber = grabber.clone();
        move || grabber.grab()
    })
    .await
    .map_err(|e| PipelineError::Join(e.to_string()))??;
    tracing::debug!("Captured {}x{} frame", frame.width, frame.height);

    let bytes = tokio::task::spawn_blocking(move || capture::encode_jpeg(frame, JPEG_QUALITY))
        .await
        .map_err(|e| PipelineError::Join(e.to_string()))??;

    let image_url = client
        .upload_image(&session_id, slide_index, bytes)
        .await
        .map_err(PipelineError::Upload)?;
    tracing::debug!("Slide image uploaded: {image_url}");

    let pointer = SlidePointer {
        slide_index,
        image_url: image_url.clone(),
        width: display.width,
        height: display.height,
        monitor_index,
        updated_at: Utc::now(),
    };
    slides.push(image_url.clone());

    client
        .set_current_slide(&session_id, &pointer, &slides)
        .await
        .map_err(PipelineError::PointerWrite)?;

    Ok(CommittedSlide {
        index: slide_index,
        image_url,
    })
}
