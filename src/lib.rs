//! Slidetap - presenter desktop helper for live slide/tap sessions.
//!
//! The presenter captures slide screenshots that are uploaded to a shared
//! cloud session; students tap on the current slide from their own devices
//! and the taps come back here as fading dots drawn over the presentation.
//!
//! Backend functionality is organized into:
//! - `capture` - display enumeration and single-frame screen grabs
//! - `config` - settings file loading and validation
//! - `coordinator` - the single-writer capture/upload pipeline
//! - `overlay` - the always-on-top fading-dot surface
//! - `session` - cloud document database and blob storage client
//! - `triggers` - hotkey / HTTP / file-sentinel capture triggers

pub mod app;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod overlay;
pub mod session;
pub mod triggers;

pub use config::Config;

use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging, load the configuration and run the helper until
/// interrupted. Configuration problems are the only fatal errors.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidetap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting slidetap v{}", VERSION);

    let config = Config::load(config_path)?;
    app::run(config).await
}
