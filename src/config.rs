//! Settings file loading and validation.
//!
//! The helper is driven by a single JSON settings file (`config.json` by
//! default). Required fields identify the shared session and the cloud
//! project; everything else has a sensible default. Validation failures here
//! are the only errors that terminate the process.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::overlay::dots::{Color, DotStyle};
use crate::overlay::OverlayMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing or empty required field: {0}")]
    MissingField(&'static str),

    #[error("Service account file not found: {0}")]
    ServiceAccountMissing(PathBuf),

    #[error("Service account file {0} is not valid JSON or has no project_id")]
    ServiceAccountInvalid(PathBuf),

    #[error("Invalid dot_color {0:?}: expected #RRGGBB")]
    InvalidColor(String),

    #[error("Invalid http_trigger_path {0:?}: must start with '/'")]
    InvalidHttpPath(String),
}

/// Identity of the cloud project, read from the service account JSON that
/// the admin console hands out. Only the project id is needed to address the
/// REST endpoints; the key material itself stays on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub client_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session identifier shared with the student page.
    pub session_id: String,

    /// Path to the service account JSON for the cloud project.
    pub service_account_path: PathBuf,

    /// Blob storage bucket for slide images.
    pub storage_bucket: String,

    /// Which monitor to capture (0 = first).
    #[serde(default)]
    pub monitor_index: usize,

    /// Tap dot fill color, `#RRGGBB`.
    #[serde(default = "defaults::dot_color")]
    pub dot_color: String,

    /// Tap dot radius in pixels.
    #[serde(default = "defaults::dot_radius_px")]
    pub dot_radius_px: u32,

    /// How long a dot takes to fade out completely, in milliseconds.
    /// 0 keeps dots visible until the next slide.
    #[serde(default = "defaults::fade_ms")]
    pub fade_ms: u64,

    /// Register the global capture hotkey.
    #[serde(default = "defaults::enabled")]
    pub enable_hotkey: bool,

    /// Overlay rendering strategy.
    #[serde(default)]
    pub overlay_mode: OverlayMode,

    /// Fill the overlay with a faint background so an empty overlay is
    /// distinguishable from a missing one.
    #[serde(default)]
    pub overlay_debug_bg: bool,

    /// Drop tap responses older than this many seconds before startup.
    /// 0 disables the filter.
    #[serde(default = "defaults::ignore_past_responses_seconds")]
    pub ignore_past_responses_seconds: u64,

    /// Loopback port for the HTTP trigger server. 0 disables it.
    #[serde(default = "defaults::http_trigger_port")]
    pub http_trigger_port: u16,

    /// Request path that triggers a capture.
    #[serde(default = "defaults::http_trigger_path")]
    pub http_trigger_path: String,

    /// Sentinel file polled for existence; absent = source disabled.
    #[serde(default)]
    pub trigger_file: Option<PathBuf>,

    /// Minimum time between accepted captures, in milliseconds.
    #[serde(default = "defaults::capture_cooldown_ms")]
    pub capture_cooldown_ms: u64,
}

mod defaults {
    pub fn dot_color() -> String {
        "#8E4EC6".to_string()
    }

    pub fn dot_radius_px() -> u32 {
        8
    }

    pub fn fade_ms() -> u64 {
        10_000
    }

    pub fn enabled() -> bool {
        true
    }

    pub fn ignore_past_responses_seconds() -> u64 {
        120
    }

    pub fn http_trigger_port() -> u16 {
        8889
    }

    pub fn http_trigger_path() -> String {
        "/capture".to_string()
    }

    pub fn capture_cooldown_ms() -> u64 {
        2_000
    }
}

impl Config {
    /// Load and validate a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the fields that serde cannot: non-empty identifiers, a parseable
    /// dot color and a well-formed trigger path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id.trim().is_empty() {
            return Err(ConfigError::MissingField("session_id"));
        }
        if self.storage_bucket.trim().is_empty() {
            return Err(ConfigError::MissingField("storage_bucket"));
        }
        if Color::parse(&self.dot_color).is_none() {
            return Err(ConfigError::InvalidColor(self.dot_color.clone()));
        }
        // "/ping" is reserved for the liveness route.
        if !self.http_trigger_path.starts_with('/') || self.http_trigger_path == "/ping" {
            return Err(ConfigError::InvalidHttpPath(self.http_trigger_path.clone()));
        }
        Ok(())
    }

    /// Read the project identity from the configured service account file.
    pub fn load_service_account(&self) -> Result<ServiceAccount, ConfigError> {
        let path = &self.service_account_path;
        if !path.exists() {
            return Err(ConfigError::ServiceAccountMissing(path.clone()));
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let account: ServiceAccount = serde_json::from_str(&contents)
            .map_err(|_| ConfigError::ServiceAccountInvalid(path.clone()))?;

        if account.project_id.trim().is_empty() {
            return Err(ConfigError::ServiceAccountInvalid(path.clone()));
        }

        Ok(account)
    }

    pub fn dot_style(&self) -> DotStyle {
        DotStyle {
            // validate() guarantees the color parses
            color: Color::parse(&self.dot_color).unwrap_or(Color {
                r: 0x8E,
                g: 0x4E,
                b: 0xC6,
            }),
            radius_px: self.dot_radius_px,
            fade: Duration::from_millis(self.fade_ms),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.capture_cooldown_ms)
    }

    /// `None` when the replay filter is disabled.
    pub fn ignore_past_window(&self) -> Option<Duration> {
        match self.ignore_past_responses_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_json() -> &'static str {
        r#"{
            "session_id": "demo-session",
            "service_account_path": "service-account.json",
            "storage_bucket": "demo.appspot.com"
        }"#
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_are_applied() {
        let (_dir, path) = write_config(minimal_json());
        let config = Config::load(&path).unwrap();

        assert_eq!(config.monitor_index, 0);
        assert_eq!(config.dot_color, "#8E4EC6");
        assert_eq!(config.dot_radius_px, 8);
        assert_eq!(config.fade_ms, 10_000);
        assert!(config.enable_hotkey);
        assert_eq!(config.overlay_mode, OverlayMode::Auto);
        assert!(!config.overlay_debug_bg);
        assert_eq!(config.http_trigger_port, 8889);
        assert_eq!(config.http_trigger_path, "/capture");
        assert_eq!(config.trigger_file, None);
        assert_eq!(config.capture_cooldown_ms, 2_000);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let (_dir, path) = write_config(r#"{ "session_id": "x" }"#);
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let (_dir, path) = write_config(
            r#"{
                "session_id": "  ",
                "service_account_path": "sa.json",
                "storage_bucket": "b"
            }"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("session_id")));
    }

    #[test]
    fn bad_dot_color_is_rejected() {
        let (_dir, path) = write_config(
            r#"{
                "session_id": "s",
                "service_account_path": "sa.json",
                "storage_bucket": "b",
                "dot_color": "purple"
            }"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidColor(_)));
    }

    #[test]
    fn http_path_must_be_absolute() {
        let (_dir, path) = write_config(
            r#"{
                "session_id": "s",
                "service_account_path": "sa.json",
                "storage_bucket": "b",
                "http_trigger_path": "capture"
            }"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHttpPath(_)));
    }

    #[test]
    fn ping_path_is_reserved() {
        let (_dir, path) = write_config(
            r#"{
                "session_id": "s",
                "service_account_path": "sa.json",
                "storage_bucket": "b",
                "http_trigger_path": "/ping"
            }"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHttpPath(_)));
    }

    #[test]
    fn ignore_past_window_zero_disables_filter() {
        let (_dir, path) = write_config(
            r#"{
                "session_id": "s",
                "service_account_path": "sa.json",
                "storage_bucket": "b",
                "ignore_past_responses_seconds": 0
            }"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.ignore_past_window(), None);
    }

    #[test]
    fn service_account_project_id_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let sa_path = dir.path().join("sa.json");
        fs::write(
            &sa_path,
            r#"{ "project_id": "demo-project", "client_email": "helper@demo.iam" }"#,
        )
        .unwrap();

        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            format!(
                r#"{{
                    "session_id": "s",
                    "service_account_path": {:?},
                    "storage_bucket": "b"
                }}"#,
                sa_path
            ),
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        let account = config.load_service_account().unwrap();
        assert_eq!(account.project_id, "demo-project");
        assert_eq!(account.client_email, "helper@demo.iam");
    }

    #[test]
    fn service_account_without_project_id_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let sa_path = dir.path().join("sa.json");
        fs::write(&sa_path, r#"{ "type": "service_account" }"#).unwrap();

        let (_cfg_dir, config_path) = write_config(&format!(
            r#"{{
                "session_id": "s",
                "service_account_path": {:?},
                "storage_bucket": "b"
            }}"#,
            sa_path
        ));

        let config = Config::load(&config_path).unwrap();
        let err = config.load_service_account().unwrap_err();
        assert!(matches!(err, ConfigError::ServiceAccountInvalid(_)));
    }
}
