//! Caption Text Layout
//!
//! Two strategies, one per caption layer:
//!
//! - [`wrap_words`]: greedy word wrap for space-delimited text
//! - [`fit_single_line`]: one line, font size reduced until it fits

use super::text::FontFace;

/// Line height relative to font size
pub const LINE_HEIGHT_FACTOR: f32 = 1.35;

/// One laid-out line
#[derive(Clone, Debug, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub width: f32,
}

/// Lines of one caption layer at a resolved font size
#[derive(Clone, Debug, PartialEq)]
pub struct LayerLayout {
    pub lines: Vec<TextLine>,
    pub size: f32,
    pub line_height: f32,
}

impl LayerLayout {
    fn empty(size: f32) -> Self {
        Self {
            lines: Vec::new(),
            size,
            line_height: size * LINE_HEIGHT_FACTOR,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total stacked height of all lines
    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

/// Greedy word wrap at `size`
///
/// Words are split on whitespace. A word wider than `max_width` on its own is
/// placed on a dedicated line rather than broken.
pub fn wrap_words(face: &dyn FontFace, text: &str, size: f32, max_width: f32) -> LayerLayout {
    let mut layout = LayerLayout::empty(size);
    let space = face.advance(' ', size);

    let mut current = String::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let word_width = face.measure(word, size);

        if current.is_empty() {
            current.push_str(word);
            current_width = word_width;
            continue;
        }

        let candidate = current_width + space + word_width;
        if candidate <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width = candidate;
        } else {
            layout.lines.push(TextLine {
                text: std::mem::take(&mut current),
                width: current_width,
            });
            current.push_str(word);
            current_width = word_width;
        }
    }

    if !current.is_empty() {
        layout.lines.push(TextLine {
            text: current,
            width: current_width,
        });
    }

    layout
}

/// Lays `text` out on a single line, shrinking the size proportionally when
/// the measured width exceeds `max_width`
pub fn fit_single_line(face: &dyn FontFace, text: &str, size: f32, max_width: f32) -> LayerLayout {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return LayerLayout::empty(size);
    }

    let measured = face.measure(&text, size);
    let (size, width) = if measured > max_width && measured > 0.0 {
        let fitted = size * (max_width / measured);
        (fitted, face.measure(&text, fitted))
    } else {
        (size, measured)
    };

    let mut layout = LayerLayout::empty(size);
    layout.lines.push(TextLine { text, width });
    layout
}

#[cfg(test)]
mod tests {
    use super::super::text::testing::MonoFace;
    use super::*;

    // MonoFace at size 20: letters 10 px, space 5 px

    #[test]
    fn test_wrap_fits_on_one_line() {
        let layout = wrap_words(&MonoFace, "ab cd", 20.0, 100.0);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.lines[0].text, "ab cd");
        assert_eq!(layout.lines[0].width, 45.0);
    }

    #[test]
    fn test_wrap_breaks_greedily() {
        // "aaa bbb" = 65 px > 60
        let layout = wrap_words(&MonoFace, "aaa bbb cc", 20.0, 60.0);
        let texts: Vec<&str> = layout.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["aaa", "bbb cc"]);
        assert!(layout.lines.iter().all(|l| l.width <= 60.0));
    }

    #[test]
    fn test_long_word_gets_own_line() {
        let layout = wrap_words(&MonoFace, "a abcdefghij b", 20.0, 50.0);
        let texts: Vec<&str> = layout.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "abcdefghij", "b"]);
        assert_eq!(layout.lines[1].width, 100.0);
    }

    #[test]
    fn test_wrap_line_height_and_empty_text() {
        let layout = wrap_words(&MonoFace, "  ", 20.0, 100.0);
        assert!(layout.is_empty());
        assert_eq!(layout.height(), 0.0);

        let layout = wrap_words(&MonoFace, "a b c", 20.0, 10.0);
        assert_eq!(layout.lines.len(), 3);
        assert!((layout.height() - 3.0 * 27.0).abs() < 1e-4);
    }

    #[test]
    fn test_fit_keeps_size_when_narrow_enough() {
        let layout = fit_single_line(&MonoFace, "你好", 20.0, 100.0);
        assert_eq!(layout.size, 20.0);
        assert_eq!(layout.lines[0].width, 20.0);
    }

    #[test]
    fn test_fit_shrinks_proportionally() {
        // 10 glyphs * 10 px = 100 px, max 50 → size halves
        let layout = fit_single_line(&MonoFace, "一二三四五六七八九十", 20.0, 50.0);
        assert_eq!(layout.lines.len(), 1);
        assert!((layout.size - 10.0).abs() < 1e-4);
        assert!(layout.lines[0].width <= 50.0 + 1e-3);
    }

    #[test]
    fn test_fit_never_wraps_and_flattens_newlines() {
        let layout = fit_single_line(&MonoFace, "第一行\n第二行", 20.0, 1000.0);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.lines[0].text, "第一行 第二行");
    }
}
