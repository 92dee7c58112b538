//! Configuration resolution for stampcard.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`~/.config/stampcard/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`STAMPCARD_*`)
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files are partial: only the sections present in a file replace the
//! sections resolved so far. Offer designs are merged by key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete stampcard configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub push: PushConfig,
    /// Offer id -> visual design of the passes issued for it.
    #[serde(default)]
    pub offers: HashMap<String, OfferDesign>,
}

/// HTTP service and pass identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: Option<PathBuf>,
    /// Base URL devices use to reach the web service (`webServiceURL`).
    pub public_url: String,
    pub pass_type_identifier: String,
    pub team_identifier: String,
    pub organization_name: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            database_path: None,
            public_url: "http://localhost:8080".to_string(),
            pass_type_identifier: "pass.dev.stampcard.loyalty".to_string(),
            team_identifier: "STAMPCARD0".to_string(),
            organization_name: "stampcard".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Pass lifecycle windows and notification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Days a completed pass stays usable before it expires.
    pub grace_days: u32,
    /// Days an expired pass is kept before soft deletion.
    pub retention_days: u32,
    /// Interval between background sweeps (seconds).
    pub sweep_interval_secs: u64,
    /// Per-pass notification ceiling over a rolling day.
    pub max_notifications_per_day: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_days: 30,
            retention_days: 90,
            sweep_interval_secs: 3600,
            max_notifications_per_day: 3,
        }
    }
}

/// Stamp renderer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Timeout for fetching business background/logo images (milliseconds).
    pub fetch_timeout_ms: u64,
    /// Largest accepted background/logo payload (bytes).
    pub max_background_bytes: usize,
    /// Number of parsed icons kept in memory.
    pub icon_cache_capacity: usize,
    /// Stamp count above which the thumbnail switches to a segmented bar.
    pub bar_threshold: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 3_000,
            max_background_bytes: 5 * 1024 * 1024, // 5 MB
            icon_cache_capacity: 64,
            bar_threshold: 20,
        }
    }
}

/// Push delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    pub apns_base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            apns_base_url: "https://api.push.apple.com".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

/// How stamps are drawn: vector icon glyphs or the business logo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Svg,
    Logo,
}

/// Visual design for the passes of one offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferDesign {
    pub title: String,
    pub icon_id: String,
    pub display_mode: DisplayMode,
    pub logo_url: Option<String>,
    pub background_image_url: Option<String>,
    pub background_color: String,
    pub foreground_color: String,
    pub label_color: String,
}

impl Default for OfferDesign {
    fn default() -> Self {
        Self {
            title: "Loyalty card".to_string(),
            icon_id: "stamp".to_string(),
            display_mode: DisplayMode::Svg,
            logo_url: None,
            background_image_url: None,
            background_color: "#1F2937".to_string(),
            foreground_color: "#F59E0B".to_string(),
            label_color: "#FFFFFF".to_string(),
        }
    }
}

/// Partial configuration as read from a single file.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    server: Option<ServerConfig>,
    lifecycle: Option<LifecycleConfig>,
    render: Option<RenderConfig>,
    push: Option<PushConfig>,
    #[serde(default)]
    offers: HashMap<String, OfferDesign>,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.lifecycle.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "lifecycle.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.lifecycle.max_notifications_per_day == 0 {
            return Err(Error::Config(
                "lifecycle.max_notifications_per_day must be positive".to_string(),
            ));
        }
        if self.render.bar_threshold == 0 {
            return Err(Error::Config(
                "render.bar_threshold must be positive".to_string(),
            ));
        }
        if self.server.pass_type_identifier.is_empty() {
            return Err(Error::Config(
                "server.pass_type_identifier is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(path) = explicit_path {
        let overlay = load_config_file(path)?;
        merge_config(&mut config, overlay);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("settings.json"))
}

/// Get the default pass database path.
pub fn database_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("passes.db"))
}

fn data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".stampcard"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/stampcard"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("stampcard"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<ConfigOverlay> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigOverlay) {
    if let Some(server) = overlay.server {
        base.server = server;
    }
    if let Some(lifecycle) = overlay.lifecycle {
        base.lifecycle = lifecycle;
    }
    if let Some(render) = overlay.render {
        base.render = render;
    }
    if let Some(push) = overlay.push {
        base.push = push;
    }
    base.offers.extend(overlay.offers);
}

/// Apply `STAMPCARD_*` overrides. `lookup` abstracts `std::env::var` so the
/// mapping can be exercised without touching the process environment.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("STAMPCARD_ADDR") {
        config.server.addr = val;
    }
    if let Some(val) = lookup("STAMPCARD_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("STAMPCARD_PUBLIC_URL") {
        config.server.public_url = val;
    }
    if let Some(val) = lookup("STAMPCARD_PASS_TYPE_ID") {
        config.server.pass_type_identifier = val;
    }
    if let Some(val) = lookup("STAMPCARD_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(n) = lookup("STAMPCARD_GRACE_DAYS").and_then(|v| v.parse().ok()) {
        config.lifecycle.grace_days = n;
    }
    if let Some(n) = lookup("STAMPCARD_RETENTION_DAYS").and_then(|v| v.parse().ok()) {
        config.lifecycle.retention_days = n;
    }
    if let Some(n) = lookup("STAMPCARD_SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.lifecycle.sweep_interval_secs = n;
    }
    if let Some(flag) = lookup("STAMPCARD_PUSH_ENABLED").and_then(|v| v.parse().ok()) {
        config.push.enabled = flag;
    }
}
