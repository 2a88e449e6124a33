//! Capture trigger sources
//!
//! Three independent ways to say "take a slide now": a global hotkey, a
//! loopback HTTP endpoint (which is also what the AutoHotkey bridge calls),
//! and a sentinel file. Each one only ever submits a request to the
//! coordinator; admission, cooldown and sequencing stay in one place.
//!
//! Sources degrade individually: a failed registration disables that source
//! and nothing else.

pub mod file;
pub mod hotkey;
pub mod http;

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

pub use file::FileTrigger;
pub use hotkey::HotkeyTrigger;
pub use http::HttpTrigger;

/// Errors while bringing a trigger source up
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Global hotkey registration failed: {0}")]
    HotkeyRegistration(String),

    #[error("Global hotkeys are not supported on this platform")]
    HotkeyUnsupported,
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Trait for capture trigger sources
///
/// Sources are started once at boot and shut down once at exit; they own
/// whatever task or thread listens in between.
#[async_trait]
pub trait TriggerSource: Send {
    /// Short name for logs ("hotkey", "http", "file").
    fn name(&self) -> &'static str;

    /// Start listening. Errors leave the source inert but harmless.
    async fn start(&mut self) -> TriggerResult<()>;

    /// Stop listening and release any OS registration.
    async fn shutdown(&mut self);
}
