//! Caption Renderer
//!
//! Draws the two caption layers of a segment onto a frame. Layers are
//! bottom-anchored and stacked: the secondary layer sits on the anchor
//! baseline, the primary layer above it. All sizes are expressed at a 1280 px
//! wide reference frame and scaled to the actual frame width.

use super::frame::Frame;
use super::layout::{fit_single_line, wrap_words, LayerLayout};
use super::text::{FontFace, FontSet};
use crate::core::captions::{CaptionSegment, StyleConfig, ViewMode};

/// Frame width at which style sizes apply unscaled
pub const REFERENCE_WIDTH: f32 = 1280.0;
/// Fraction of the frame width available to a caption line
pub const MAX_WIDTH_RATIO: f32 = 0.9;
/// Vertical gap between layers at reference width
pub const LAYER_GAP_PX: f32 = 6.0;
/// Stroke width relative to font size
pub const STROKE_RATIO: f32 = 0.08;
/// Outline drawn beneath the fill of every glyph
pub const STROKE_COLOR: [u8; 4] = [0, 0, 0, 220];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptionLayer {
    Primary,
    Secondary,
}

/// Placement of one drawn layer, in frame pixels
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedLayer {
    pub layer: CaptionLayer,
    pub layout: LayerLayout,
    pub top: f32,
    pub bottom: f32,
    pub stroke_width: f32,
}

/// What a render call drew, for inspection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedCaption {
    pub layers: Vec<RenderedLayer>,
}

impl RenderedCaption {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, layer: CaptionLayer) -> Option<&RenderedLayer> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

/// Lays out and composites caption text
#[derive(Clone)]
pub struct CaptionRenderer {
    fonts: FontSet,
}

impl CaptionRenderer {
    pub fn new(fonts: FontSet) -> Self {
        Self { fonts }
    }

    pub fn render(
        &self,
        frame: &mut Frame,
        segment: &CaptionSegment,
        style: &StyleConfig,
        view_mode: ViewMode,
    ) -> RenderedCaption {
        let mut rendered = RenderedCaption::default();
        if view_mode == ViewMode::Off || frame.width == 0 || frame.height == 0 {
            return rendered;
        }

        let frame_width = frame.width as f32;
        let scale = frame_width / REFERENCE_WIDTH;
        let max_width = frame_width * MAX_WIDTH_RATIO;
        let gap = LAYER_GAP_PX * scale;
        let position = style.vertical_position_percent.clamp(0.0, 100.0);
        let mut anchor = frame.height as f32 * (1.0 - position / 100.0);

        // Nearest the anchor first
        let mut layers: Vec<(CaptionLayer, LayerLayout, &dyn FontFace, [u8; 4])> = Vec::new();
        if view_mode.shows_secondary() {
            let face = self.fonts.secondary.as_ref();
            let layout = fit_single_line(
                face,
                &segment.secondary_text,
                style.secondary_size_px * scale,
                max_width,
            );
            layers.push((CaptionLayer::Secondary, layout, face, style.secondary_color.to_array()));
        }
        if view_mode.shows_primary() {
            let face = self.fonts.primary.as_ref();
            let layout = wrap_words(
                face,
                &segment.primary_text,
                style.primary_size_px * scale,
                max_width,
            );
            layers.push((CaptionLayer::Primary, layout, face, style.primary_color.to_array()));
        }

        for (layer, layout, face, color) in layers {
            if layout.is_empty() {
                continue;
            }

            let bottom = anchor;
            let top = bottom - layout.height();
            let stroke_width = (layout.size * STROKE_RATIO).max(1.0);

            for (i, line) in layout.lines.iter().enumerate() {
                let line_top = top + i as f32 * layout.line_height;
                let ascent = face.ascent(layout.size);
                let descent = face.descent(layout.size);
                let baseline = line_top + (layout.line_height - (ascent + descent)) / 2.0 + ascent;
                let x = (frame_width - line.width) / 2.0;

                draw_line(
                    frame,
                    face,
                    &line.text,
                    layout.size,
                    x,
                    baseline,
                    color,
                    stroke_width,
                );
            }

            rendered.layers.push(RenderedLayer {
                layer,
                layout,
                top,
                bottom,
                stroke_width,
            });
            anchor = top - gap;
        }

        rendered
    }
}

// =============================================================================
// Compositing
// =============================================================================

/// Coverage mask of one text line with room for the stroke
struct LineMask {
    origin_x: i32,
    origin_y: i32,
    width: usize,
    height: usize,
    fill: Vec<u8>,
}

#[allow(clippy::too_many_arguments)]
fn draw_line(
    frame: &mut Frame,
    face: &dyn FontFace,
    text: &str,
    size: f32,
    x: f32,
    baseline: f32,
    color: [u8; 4],
    stroke_width: f32,
) {
    // A canvas-style stroke of width w extends w/2 beyond the glyph edge
    let radius = (stroke_width / 2.0).round().max(1.0) as i32;
    let mask = rasterize_line(face, text, size, x, baseline, radius);
    let stroke = dilate(&mask, radius);

    blit(frame, &mask, &stroke, STROKE_COLOR);
    blit(frame, &mask, &mask.fill, color);
}

fn rasterize_line(
    face: &dyn FontFace,
    text: &str,
    size: f32,
    x: f32,
    baseline: f32,
    radius: i32,
) -> LineMask {
    let pad = radius + 2;
    let ascent = face.ascent(size).ceil() as i32;
    let descent = face.descent(size).ceil() as i32;
    let width = (face.measure(text, size).ceil() as i32 + 2 * pad).max(1) as usize;
    let height = (ascent + descent + 2 * pad).max(1) as usize;
    let mut fill = vec![0u8; width * height];

    let mask_baseline = pad + ascent;
    let mut pen = pad as f32;

    for ch in text.chars() {
        let glyph = face.rasterize(ch, size);
        let gx = pen.round() as i32 + glyph.xmin;
        let gy = mask_baseline - (glyph.ymin + glyph.height as i32);

        for row in 0..glyph.height {
            let my = gy + row as i32;
            if my < 0 || my >= height as i32 {
                continue;
            }
            for col in 0..glyph.width {
                let mx = gx + col as i32;
                if mx < 0 || mx >= width as i32 {
                    continue;
                }
                let idx = my as usize * width + mx as usize;
                fill[idx] = fill[idx].max(glyph.coverage[row * glyph.width + col]);
            }
        }
        pen += glyph.advance;
    }

    LineMask {
        origin_x: x.round() as i32 - pad,
        origin_y: baseline.round() as i32 - mask_baseline,
        width,
        height,
        fill,
    }
}

/// Grows coverage by `radius` pixels using a disc kernel
fn dilate(mask: &LineMask, radius: i32) -> Vec<u8> {
    let offsets: Vec<(i32, i32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|(dx, dy)| dx * dx + dy * dy <= radius * radius)
        .collect();

    let (w, h) = (mask.width as i32, mask.height as i32);
    let mut out = vec![0u8; mask.fill.len()];

    for y in 0..h {
        for x in 0..w {
            let c = mask.fill[(y * w + x) as usize];
            if c == 0 {
                continue;
            }
            for &(dx, dy) in &offsets {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let idx = (ny * w + nx) as usize;
                out[idx] = out[idx].max(c);
            }
        }
    }

    out
}

fn blit(frame: &mut Frame, mask: &LineMask, coverage: &[u8], color: [u8; 4]) {
    for row in 0..mask.height {
        for col in 0..mask.width {
            let c = coverage[row * mask.width + col];
            if c > 0 {
                frame.blend(mask.origin_x + col as i32, mask.origin_y + row as i32, color, c);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
