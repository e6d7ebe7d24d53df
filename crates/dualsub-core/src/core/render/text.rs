//! Font Faces
//!
//! Glyph metrics and coverage masks behind the [`FontFace`] trait, a
//! `fontdue`-backed implementation, and discovery of suitable system fonts
//! for each caption layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fontdue::{Font, FontSettings};
use tracing::{debug, warn};

use crate::core::{CoreError, CoreResult};

/// Coverage mask for one character, positioned relative to the pen
///
/// `ymin` is the offset from the baseline to the bottom edge of the mask
/// (positive is up), matching the usual font coordinate system.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Glyph {
    pub xmin: i32,
    pub ymin: i32,
    pub width: usize,
    pub height: usize,
    pub advance: f32,
    pub coverage: Vec<u8>,
}

/// Source of glyph metrics and coverage masks at arbitrary pixel sizes
pub trait FontFace: Send + Sync {
    /// Horizontal advance of `ch` at `size` px
    fn advance(&self, ch: char, size: f32) -> f32;

    /// Distance from baseline to the top of the tallest glyphs
    fn ascent(&self, size: f32) -> f32;

    /// Distance from baseline to the bottom of descenders (positive)
    fn descent(&self, size: f32) -> f32;

    fn rasterize(&self, ch: char, size: f32) -> Arc<Glyph>;

    /// Width of a single-line string
    fn measure(&self, text: &str, size: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, size)).sum()
    }
}

// =============================================================================
// fontdue Backend
// =============================================================================

type GlyphKey = (char, u32);

/// A TTF/OTF/TTC font rasterized with `fontdue`
pub struct FontdueFace {
    font: Font,
    path: PathBuf,
    cache: Mutex<HashMap<GlyphKey, Arc<Glyph>>>,
}

impl FontdueFace {
    /// Loads the first face of a font file
    pub fn load(path: &Path) -> CoreResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            CoreError::Capability(format!("cannot read font {}: {}", path.display(), e))
        })?;
        Self::from_bytes(bytes, path)
    }

    pub fn from_bytes(bytes: Vec<u8>, path: &Path) -> CoreResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
            CoreError::Capability(format!("cannot parse font {}: {}", path.display(), e))
        })?;
        Ok(Self {
            font,
            path: path.to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FontdueFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontdueFace").field("path", &self.path).finish()
    }
}

impl FontFace for FontdueFace {
    fn advance(&self, ch: char, size: f32) -> f32 {
        self.font.metrics(ch, size).advance_width
    }

    fn ascent(&self, size: f32) -> f32 {
        self.font
            .horizontal_line_metrics(size)
            .map(|m| m.ascent)
            .unwrap_or(size * 0.8)
    }

    fn descent(&self, size: f32) -> f32 {
        self.font
            .horizontal_line_metrics(size)
            .map(|m| -m.descent)
            .unwrap_or(size * 0.2)
    }

    fn rasterize(&self, ch: char, size: f32) -> Arc<Glyph> {
        let key = (ch, size.to_bits());
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(key)
            .or_insert_with(|| {
                let (metrics, coverage) = self.font.rasterize(ch, size);
                Arc::new(Glyph {
                    xmin: metrics.xmin,
                    ymin: metrics.ymin,
                    width: metrics.width,
                    height: metrics.height,
                    advance: metrics.advance_width,
                    coverage,
                })
            })
            .clone()
    }
}

// =============================================================================
// Font Discovery
// =============================================================================

/// Faces for the two caption layers
#[derive(Clone)]
pub struct FontSet {
    pub primary: Arc<dyn FontFace>,
    pub secondary: Arc<dyn FontFace>,
}

impl FontSet {
    pub fn new(primary: Arc<dyn FontFace>, secondary: Arc<dyn FontFace>) -> Self {
        Self { primary, secondary }
    }

    /// Loads configured fonts, falling back to well-known system fonts
    ///
    /// The secondary layer prefers a CJK-capable face; if none is installed the
    /// primary face is reused.
    pub fn discover(primary: Option<&Path>, secondary: Option<&Path>) -> CoreResult<Self> {
        let primary_face: Arc<dyn FontFace> = match primary {
            Some(path) => Arc::new(FontdueFace::load(path)?),
            None => Arc::new(load_first(&primary_font_candidates()).ok_or_else(|| {
                CoreError::Capability(
                    "no usable font found; configure fonts.primaryFont in settings".to_string(),
                )
            })?),
        };

        let secondary_face: Arc<dyn FontFace> = match secondary {
            Some(path) => Arc::new(FontdueFace::load(path)?),
            None => match load_first(&secondary_font_candidates()) {
                Some(face) => Arc::new(face),
                None => {
                    warn!("No CJK-capable font found; secondary captions use the primary font");
                    primary_face.clone()
                }
            },
        };

        Ok(Self::new(primary_face, secondary_face))
    }
}

fn load_first(candidates: &[PathBuf]) -> Option<FontdueFace> {
    candidates
        .iter()
        .filter(|path| path.is_file())
        .find_map(|path| match FontdueFace::load(path) {
            Ok(face) => {
                debug!("Using font {}", path.display());
                Some(face)
            }
            Err(e) => {
                warn!("Skipping font: {}", e);
                None
            }
        })
}

fn primary_font_candidates() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "windows")]
    {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| r"C:\Windows".to_string());
        let fonts = PathBuf::from(windir).join("Fonts");
        paths.push(fonts.join("segoeui.ttf"));
        paths.push(fonts.join("arial.ttf"));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/System/Library/Fonts/Supplemental/Arial.ttf"));
        paths.push(PathBuf::from("/Library/Fonts/Arial.ttf"));
        paths.push(PathBuf::from("/System/Library/Fonts/Helvetica.ttc"));
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        for dir in ["/usr/share/fonts", "/usr/local/share/fonts"] {
            let dir = PathBuf::from(dir);
            paths.push(dir.join("truetype/dejavu/DejaVuSans.ttf"));
            paths.push(dir.join("TTF/DejaVuSans.ttf"));
            paths.push(dir.join("dejavu/DejaVuSans.ttf"));
            paths.push(dir.join("truetype/liberation/LiberationSans-Regular.ttf"));
            paths.push(dir.join("liberation-sans/LiberationSans-Regular.ttf"));
            paths.push(dir.join("noto/NotoSans-Regular.ttf"));
        }
    }

    paths
}

fn secondary_font_candidates() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "windows")]
    {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| r"C:\Windows".to_string());
        let fonts = PathBuf::from(windir).join("Fonts");
        paths.push(fonts.join("msyh.ttc"));
        paths.push(fonts.join("simhei.ttf"));
        paths.push(fonts.join("YuGothM.ttc"));
        paths.push(fonts.join("malgun.ttf"));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/System/Library/Fonts/PingFang.ttc"));
        paths.push(PathBuf::from("/System/Library/Fonts/Hiragino Sans GB.ttc"));
        paths.push(PathBuf::from("/Library/Fonts/Arial Unicode.ttf"));
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        for dir in ["/usr/share/fonts", "/usr/local/share/fonts"] {
            let dir = PathBuf::from(dir);
            paths.push(dir.join("opentype/noto/NotoSansCJK-Regular.ttc"));
            paths.push(dir.join("noto-cjk/NotoSansCJK-Regular.ttc"));
            paths.push(dir.join("google-noto-cjk/NotoSansCJK-Regular.ttc"));
            paths.push(dir.join("truetype/wqy/wqy-microhei.ttc"));
            paths.push(dir.join("wenquanyi/wqy-microhei/wqy-microhei.ttc"));
            paths.push(dir.join("truetype/droid/DroidSansFallbackFull.ttf"));
        }
    }

    if let Some(home) = dirs::font_dir() {
        paths.push(home.join("NotoSansCJK-Regular.ttc"));
    }

    paths
}

// =============================================================================
// Test Support
// =============================================================================
