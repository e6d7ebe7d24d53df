//! Caption Data Models
//!
//! Defines the bilingual caption segment and the value objects that control
//! how it is drawn.
//!
//! # Overview
//!
//! - `CaptionSegment`: one timed unit with a primary and a secondary text variant
//! - `StyleConfig`: per-layer font sizes and colors plus the anchor position
//! - `ViewMode`: which layer(s) are drawn

use serde::{Deserialize, Serialize};

use crate::core::TimeSec;

// =============================================================================
// Caption Segment
// =============================================================================

/// A timed caption with two parallel text variants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSegment {
    /// Start time in seconds
    pub start_time: TimeSec,
    /// End time in seconds (exclusive)
    pub end_time: TimeSec,
    /// Text in the space-delimited language (word-wrapped when drawn)
    pub primary_text: String,
    /// Text in the dense-script language (shrunk to fit when drawn)
    pub secondary_text: String,
}

impl CaptionSegment {
    /// Creates a new segment
    pub fn new(start_time: TimeSec, end_time: TimeSec, primary: &str, secondary: &str) -> Self {
        Self {
            start_time,
            end_time,
            primary_text: primary.to_string(),
            secondary_text: secondary.to_string(),
        }
    }

    /// Returns the duration of this segment in seconds
    pub fn duration(&self) -> TimeSec {
        self.end_time - self.start_time
    }

    /// Returns true if the segment is active at the given time (half-open interval)
    pub fn contains(&self, time: TimeSec) -> bool {
        time >= self.start_time && time < self.end_time
    }

    /// Returns true if this segment overlaps with another
    pub fn overlaps(&self, other: &CaptionSegment) -> bool {
        self.start_time < other.end_time && self.end_time > other.start_time
    }
}

// =============================================================================
// Colors
// =============================================================================

/// RGBA color value (0-255 for each component)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Creates a new color from RGBA components
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque color from RGB components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub const fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    /// Warm yellow commonly used for the translated line
    pub const fn amber() -> Self {
        Self::rgb(0xFF, 0xD5, 0x4F)
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA` (leading `#` optional)
    pub fn from_hex(value: &str) -> Option<Self> {
        let hex = value.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Converts to hex string (e.g., "#FFFFFF" or "#FFFFFF80" with alpha)
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    pub(crate) fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::white()
    }
}

// =============================================================================
// Caption Styling
// =============================================================================

/// Caption style for both text layers
///
/// Sizes are in pixels at a 1280 px wide frame; the renderer scales them to the
/// actual frame width.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    pub primary_size_px: f32,
    pub secondary_size_px: f32,
    pub primary_color: Color,
    pub secondary_color: Color,
    /// Anchor baseline as a percentage of frame height, measured from the bottom
    pub vertical_position_percent: f32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            primary_size_px: 36.0,
            secondary_size_px: 30.0,
            primary_color: Color::white(),
            secondary_color: Color::amber(),
            vertical_position_percent: 8.0,
        }
    }
}

// =============================================================================
// View Mode
// =============================================================================

/// Which caption layer(s) are drawn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Dual,
    PrimaryOnly,
    SecondaryOnly,
    Off,
}

impl ViewMode {
    pub fn shows_primary(self) -> bool {
        matches!(self, Self::Dual | Self::PrimaryOnly)
    }

    pub fn shows_secondary(self) -> bool {
        matches!(self, Self::Dual | Self::SecondaryOnly)
    }
}

impl std::str::FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "dual" => Ok(Self::Dual),
            "primary-only" | "primary" => Ok(Self::PrimaryOnly),
            "secondary-only" | "secondary" => Ok(Self::SecondaryOnly),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!(
                "unknown view mode '{other}' (expected dual, primary-only, secondary-only, off)"
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Segment Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_segment_containment_is_half_open() {
        let seg = CaptionSegment::new(2.0, 5.0, "Hello", "你好");

        assert!(!seg.contains(1.999));
        assert!(seg.contains(2.0));
        assert!(seg.contains(4.99));
        assert!(!seg.contains(5.0));
    }

    #[test]
    fn test_segment_overlap() {
        let a = CaptionSegment::new(0.0, 3.0, "a", "甲");
        let b = CaptionSegment::new(2.0, 5.0, "b", "乙");
        let c = CaptionSegment::new(3.0, 6.0, "c", "丙");

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching is not overlapping
    }

    #[test]
    fn test_segment_serializes_camel_case() {
        let seg = CaptionSegment::new(1.5, 4.5, "Hi", "嗨");
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"startTime\":1.5"));
        assert!(json.contains("\"secondaryText\":\"嗨\""));
    }

    // -------------------------------------------------------------------------
    // Color Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_color_hex_roundtrip() {
        assert_eq!(Color::from_hex("#FFD54F"), Some(Color::amber()));
        assert_eq!(Color::from_hex("ff000080"), Some(Color::rgba(255, 0, 0, 128)));
        assert_eq!(Color::rgba(255, 0, 0, 128).to_hex(), "#FF000080");
        assert_eq!(Color::white().to_hex(), "#FFFFFF");
    }

    #[test]
    fn test_color_hex_rejects_garbage() {
        assert_eq!(Color::from_hex("#FFF"), None);
        assert_eq!(Color::from_hex("#GGGGGG"), None);
        assert_eq!(Color::from_hex("#ÄÄÄ"), None);
    }

    // -------------------------------------------------------------------------
    // View Mode Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_view_mode_layers() {
        assert!(ViewMode::Dual.shows_primary() && ViewMode::Dual.shows_secondary());
        assert!(ViewMode::PrimaryOnly.shows_primary());
        assert!(!ViewMode::PrimaryOnly.shows_secondary());
        assert!(!ViewMode::Off.shows_primary() && !ViewMode::Off.shows_secondary());
    }

    #[test]
    fn test_view_mode_from_str() {
        assert_eq!("primary-only".parse::<ViewMode>(), Ok(ViewMode::PrimaryOnly));
        assert_eq!("secondary_only".parse::<ViewMode>(), Ok(ViewMode::SecondaryOnly));
        assert_eq!("OFF".parse::<ViewMode>(), Ok(ViewMode::Off));
        assert!("both".parse::<ViewMode>().is_err());
    }

    #[test]
    fn test_style_serialization() {
        let style = StyleConfig::default();
        let json = serde_json::to_string(&style).unwrap();
        let parsed: StyleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, style);
    }
}
