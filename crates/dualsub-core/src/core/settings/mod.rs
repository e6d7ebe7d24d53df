//! Settings Persistence System
//!
//! Provides persistent settings with:
//! - Atomic file writes (temp file + rename)
//! - Tolerant loading: missing fields take defaults, bad values are clamped
//! - An advisory lock file against concurrent writers
//!
//! Storage location: {config_dir}/dualsub/settings.json

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::captions::{Color, StyleConfig, ViewMode};
use crate::core::fs::atomic_write_json_pretty;
use crate::core::render::{ExportFormat, ExportLimits};
use crate::core::{CoreError, CoreResult, Dimensions};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Directory under the platform config dir
pub const APP_DIR_NAME: &str = "dualsub";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub export: ExportSettings,

    #[serde(default)]
    pub style: StyleSettings,

    #[serde(default)]
    pub fonts: FontSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            export: ExportSettings::default(),
            style: StyleSettings::default(),
            fonts: FontSettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Bad values are corrected instead of rejected, so an old or hand-edited
    /// file never prevents startup.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.export.video_bitrate = self.export.video_bitrate.clamp(100_000, 100_000_000);
        self.export.audio_bitrate = self.export.audio_bitrate.clamp(32_000, 512_000);
        self.export.default_format = normalize_enum(
            &self.export.default_format,
            &["mp4", "webm"],
            default_export_format(),
        );
        self.export.max_width = self.export.max_width.clamp(16, 7680);
        self.export.max_height = self.export.max_height.clamp(16, 4320);

        self.style.primary_size_px = clamp_f64(self.style.primary_size_px, 8.0, 200.0);
        self.style.secondary_size_px = clamp_f64(self.style.secondary_size_px, 8.0, 200.0);
        self.style.vertical_position_percent =
            clamp_f64(self.style.vertical_position_percent, 0.0, 90.0);
        if Color::from_hex(&self.style.primary_color).is_none() {
            self.style.primary_color = default_primary_color();
        }
        if Color::from_hex(&self.style.secondary_color).is_none() {
            self.style.secondary_color = default_secondary_color();
        }

        self.fonts.primary_font = self.fonts.primary_font.take().filter(|p| !p.as_os_str().is_empty());
        self.fonts.secondary_font = self.fonts.secondary_font.take().filter(|p| !p.as_os_str().is_empty());

        self.playback.default_view_mode = normalize_enum(
            &self.playback.default_view_mode.replace('_', "-"),
            &["dual", "primary-only", "secondary-only", "off"],
            default_view_mode(),
        );
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Video bitrate in bits per second
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u64,

    /// Audio bitrate in bits per second
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u64,

    /// Default export format: "mp4", "webm"
    #[serde(default = "default_export_format")]
    pub default_format: String,

    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Pace exports at the capture frame rate
    #[serde(default)]
    pub realtime: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            video_bitrate: default_video_bitrate(),
            audio_bitrate: default_audio_bitrate(),
            default_format: default_export_format(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            realtime: false,
        }
    }
}

impl ExportSettings {
    pub fn format(&self) -> ExportFormat {
        self.default_format.parse().unwrap_or_default()
    }

    pub fn limits(&self) -> ExportLimits {
        ExportLimits {
            video_bitrate: self.video_bitrate,
            audio_bitrate: self.audio_bitrate,
            max_dimensions: Dimensions::new(self.max_width, self.max_height),
            realtime: self.realtime,
        }
    }
}

fn default_video_bitrate() -> u64 {
    5_000_000
}

fn default_audio_bitrate() -> u64 {
    192_000
}

fn default_export_format() -> String {
    "mp4".to_string()
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

/// Caption style, stored with hex colors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleSettings {
    #[serde(default = "default_primary_size")]
    pub primary_size_px: f64,

    #[serde(default = "default_secondary_size")]
    pub secondary_size_px: f64,

    /// "#RRGGBB" or "#RRGGBBAA"
    #[serde(default = "default_primary_color")]
    pub primary_color: String,

    #[serde(default = "default_secondary_color")]
    pub secondary_color: String,

    /// Distance of the caption block from the bottom edge (0 - 90)
    #[serde(default = "default_vertical_position")]
    pub vertical_position_percent: f64,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            primary_size_px: default_primary_size(),
            secondary_size_px: default_secondary_size(),
            primary_color: default_primary_color(),
            secondary_color: default_secondary_color(),
            vertical_position_percent: default_vertical_position(),
        }
    }
}

impl StyleSettings {
    pub fn to_style_config(&self) -> StyleConfig {
        let defaults = StyleConfig::default();
        StyleConfig {
            primary_size_px: self.primary_size_px as f32,
            secondary_size_px: self.secondary_size_px as f32,
            primary_color: Color::from_hex(&self.primary_color).unwrap_or(defaults.primary_color),
            secondary_color: Color::from_hex(&self.secondary_color)
                .unwrap_or(defaults.secondary_color),
            vertical_position_percent: self.vertical_position_percent as f32,
        }
    }
}

fn default_primary_size() -> f64 {
    36.0
}

fn default_secondary_size() -> f64 {
    30.0
}

fn default_primary_color() -> String {
    Color::white().to_hex()
}

fn default_secondary_color() -> String {
    Color::amber().to_hex()
}

fn default_vertical_position() -> f64 {
    8.0
}

/// Font overrides; unset entries are discovered from the system
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontSettings {
    #[serde(default)]
    pub primary_font: Option<PathBuf>,

    /// Font with CJK coverage for the secondary line
    #[serde(default)]
    pub secondary_font: Option<PathBuf>,
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSettings {
    /// "dual", "primary-only", "secondary-only", "off"
    #[serde(default = "default_view_mode")]
    pub default_view_mode: String,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_view_mode: default_view_mode(),
        }
    }
}

impl PlaybackSettings {
    pub fn view_mode(&self) -> ViewMode {
        self.default_view_mode.parse().unwrap_or_default()
    }
}

fn default_view_mode() -> String {
    "dual".to_string()
}

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a settings manager storing its file in `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    /// Manager for the platform config directory, if the platform has one
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(APP_DIR_NAME)))
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = migrate(settings);
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Normalizes and saves settings atomically; returns what was written
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            atomic_write_json_pretty(&self.settings_path, &normalized)
                .map_err(|e| CoreError::Internal(format!("Failed to save settings: {}", e)))?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default())
        })
    }
}

fn migrate(mut settings: AppSettings) -> AppSettings {
    settings.version = SETTINGS_VERSION;
    settings
}
