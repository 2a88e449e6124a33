//! Remote session plumbing
//!
//! The presenter and the student page meet in a shared cloud session: a
//! document holding the current slide pointer, a blob storage folder of slide
//! images, and per-slide response collections. Everything the coordinator
//! needs from the cloud goes through the [`SessionClient`] trait so the
//! pipeline can run against an in-memory double in tests.

pub mod firebase;
pub mod watcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use firebase::FirebaseSessionClient;
pub use watcher::ResponseWatcher;

/// Errors from the cloud boundary
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cloud request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    Malformed(String),

    #[error("Worker join failed: {0}")]
    Join(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// The "current slide" pointer as written to the session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlidePointer {
    pub slide_index: u64,
    pub image_url: String,
    /// Capture dimensions, so clients can reason about aspect ratio.
    pub width: u32,
    pub height: u32,
    pub monitor_index: usize,
    pub updated_at: DateTime<Utc>,
}

/// What the remote session document currently holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Index of the slide students currently see, if any slide exists yet.
    pub slide_index: Option<u64>,
    /// Image URLs of every slide uploaded so far, in order.
    pub slides: Vec<String>,
}

/// One student's tap on the current slide
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapResponse {
    /// Server-assigned document id, used for de-duplication.
    pub id: String,
    pub slide_index: u64,
    /// Normalized coordinates in [0, 1].
    pub x: f64,
    pub y: f64,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// Trait for the cloud session boundary
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Fetch the session document; a session that does not exist yet is an
    /// empty snapshot, not an error.
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionSnapshot>;

    /// Upload one encoded slide image and return its public URL.
    async fn upload_image(
        &self,
        session_id: &str,
        slide_index: u64,
        bytes: Vec<u8>,
    ) -> SessionResult<String>;

    /// Commit a new current-slide pointer together with the accumulated
    /// slide list. This is the only write students observe; it must happen
    /// last in the capture pipeline.
    async fn set_current_slide(
        &self,
        session_id: &str,
        pointer: &SlidePointer,
        slides: &[String],
    ) -> SessionResult<()>;

    /// Fetch all tap responses recorded for one slide.
    async fn fetch_tap_responses(
        &self,
        session_id: &str,
        slide_index: u64,
    ) -> SessionResult<Vec<TapResponse>>;
}
